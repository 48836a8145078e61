use crate::common::arraydef::IntArray;
use crate::common::arrayparser::parse_throttled_array;

#[macro_export]
macro_rules! arg_wrapper {
    ($name:ident, $wrapped_type:ty, $parser:expr) => {
        #[derive(Clone)]
        pub struct $name($wrapped_type);

        impl ::std::str::FromStr for $name {
            type Err = ::anyhow::Error;

            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                ::std::result::Result::Ok(Self($parser(s)?))
            }
        }

        impl $name {
            pub fn get(&self) -> &$wrapped_type {
                &self.0
            }
            pub fn unpack(self) -> $wrapped_type {
                self.0
            }
        }
    };
}

// Array indices with an optional `%N` concurrency limit (`0-9%2`)
arg_wrapper!(ThrottledArrayArg, (IntArray, Option<u32>), parse_throttled_array);
