//! Payload-unpacking helpers for [`crate::process_stream`] (§4.3).
//!
//! The source API splats a tuple positionally or a mapping by keyword into
//! the callback's parameter list. Rust has neither variadic positional
//! splatting nor keyword arguments, so the three modes become three distinct
//! ways to go from a stored `Payload` to the exact arguments a callback
//! wants:
//!
//! - default: the callback receives the payload as-is.
//! - positional: the payload is a tuple, unpacked via [`UnpackArgs`].
//! - keyword: the payload is a `HashMap<String, V>`, and the callback's
//!   parameter type implements [`FromKwargs`] to build itself from it (the
//!   same "extractor" shape web frameworks use for typed request parameters).

use std::collections::HashMap;

/// Implemented by tuple-shaped payloads that unpack into positional
/// arguments. `Args` is usually `Self` (tuples already look like argument
/// lists); the trait exists mainly as a documented seam so callers can see
/// at a glance which payload shapes support `unpack_args` mode.
pub trait UnpackArgs {
    type Args;
    fn unpack_args(self) -> Self::Args;
}

macro_rules! impl_unpack_args_tuple {
    ($($t:ident),+) => {
        impl<$($t),+> UnpackArgs for ($($t,)+) {
            type Args = ($($t,)+);
            fn unpack_args(self) -> Self::Args {
                self
            }
        }
    };
}

impl_unpack_args_tuple!(A);
impl_unpack_args_tuple!(A, B);
impl_unpack_args_tuple!(A, B, C);
impl_unpack_args_tuple!(A, B, C, D);

/// Implemented by types that can build themselves from a keyword payload, the
/// Rust stand-in for splatting a mapping into named parameters.
pub trait FromKwargs<V>: Sized {
    /// Builds `Self` from the keyword map. Returns `None` for a required key
    /// missing from the map; callers surface this as a `ContractViolation`.
    fn from_kwargs(map: &HashMap<String, V>) -> Option<Self>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tuple_unpacks_args_identically() {
        let payload = (1u32, "two".to_string());
        assert_eq!(payload.unpack_args(), (1u32, "two".to_string()));
    }

    struct Greeting {
        name: String,
        times: u32,
    }

    impl FromKwargs<String> for Greeting {
        fn from_kwargs(map: &HashMap<String, String>) -> Option<Self> {
            Some(Greeting {
                name: map.get("name")?.clone(),
                times: map.get("times")?.parse().ok()?,
            })
        }
    }

    #[test]
    fn from_kwargs_builds_from_map() {
        let mut map = HashMap::new();
        map.insert("name".to_string(), "Ada".to_string());
        map.insert("times".to_string(), "3".to_string());
        let g = Greeting::from_kwargs(&map).unwrap();
        assert_eq!(g.name, "Ada");
        assert_eq!(g.times, 3);
    }

    #[test]
    fn from_kwargs_reports_missing_key() {
        let map = HashMap::new();
        assert!(Greeting::from_kwargs(&map).is_none());
    }
}
