use signal_hook::iterator::{Handle, Signals};

/// Listens for the given signals on a dedicated thread and passes every received
/// signal to `on_signal`.
pub struct SignalThread {
    signal_thread: Option<std::thread::JoinHandle<()>>,
    signal_handle: Handle,
}

impl SignalThread {
    pub fn new<F>(signals: &[i32], on_signal: F) -> anyhow::Result<Self>
    where
        F: Fn(i32) + Send + 'static,
    {
        let mut signals = Signals::new(signals)
            .map_err(|error| anyhow::anyhow!("Cannot create signal set: {error}"))?;
        let signal_handle = signals.handle();
        let signal_thread = std::thread::spawn(move || {
            for signal in &mut signals {
                log::debug!("Received signal {signal}");
                on_signal(signal);
            }
        });
        Ok(Self {
            signal_handle,
            signal_thread: Some(signal_thread),
        })
    }
}

impl Drop for SignalThread {
    fn drop(&mut self) {
        self.signal_handle.close();
        if let Some(thread) = self.signal_thread.take() {
            if thread.join().is_err() {
                log::error!("Signal thread crashed");
            }
        }
    }
}
