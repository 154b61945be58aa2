use std::time::{Duration, Instant};

pub mod cli;

pub use toml;

/// Offer, round or similar valid until this instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ValidUntil(Instant);

impl ValidUntil {
    #[inline]
    pub fn new(now: Instant, valid_for: Duration) -> Self {
        Self(now + valid_for)
    }

    #[inline]
    pub fn valid(&self, now: Instant) -> bool {
        self.0 > now
    }
}

/// Run this on your config struct to generate a test checking that the
/// default config survives a trip through its TOML representation.
#[macro_export]
macro_rules! gen_serialize_deserialize_test {
    ($ident:ident) => {
        #[test]
        fn test_cargo_toml_serialize_deserialize() {
            let serialized = $crate::toml::to_string(&$ident::default()).unwrap();
            let deserialized: $ident = $crate::toml::from_str(&serialized).unwrap();

            assert_eq!($ident::default(), deserialized);
        }
    };
}
