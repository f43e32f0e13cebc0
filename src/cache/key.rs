//! Cache key derivation.
//!
//! Keys are never chosen by callers; they are derived from the request
//! descriptor. [`ParamsHashKeyGenerator`] hashes the descriptor's canonical
//! string, so two descriptors get the same key exactly when they render the
//! same. [`SourceHashKeyGenerator`] hashes only the `source` value, which is
//! what a source-image tier wants: every transform of one origin shares one
//! entry.

use crate::params::Params;
use sha2::digest::Output;
use sha2::{Digest, Sha256};
use std::fmt::LowerHex;
use std::marker::PhantomData;

pub trait KeyGenerator: Send + Sync {
    fn key(&self, params: &Params) -> String;
}

/// Lower-case hex of `D(data)`.
pub fn hex_digest<D: Digest>(data: &[u8]) -> String
where
    Output<D>: LowerHex,
{
    format!("{:x}", D::digest(data))
}

/// Hex digest of the whole descriptor's canonical form.
pub struct ParamsHashKeyGenerator<D = Sha256> {
    _digest: PhantomData<fn() -> D>,
}

impl<D: Digest> ParamsHashKeyGenerator<D> {
    pub fn new() -> Self {
        Self {
            _digest: PhantomData,
        }
    }
}

impl<D: Digest> Default for ParamsHashKeyGenerator<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Digest> KeyGenerator for ParamsHashKeyGenerator<D>
where
    Output<D>: LowerHex,
{
    fn key(&self, params: &Params) -> String {
        hex_digest::<D>(params.to_string().as_bytes())
    }
}

/// Hex digest of `params["source"]` alone.
///
/// A descriptor without a source hashes the empty string; the provider below
/// will reject it before anything is stored.
pub struct SourceHashKeyGenerator<D = Sha256> {
    _digest: PhantomData<fn() -> D>,
}

impl<D: Digest> SourceHashKeyGenerator<D> {
    pub fn new() -> Self {
        Self {
            _digest: PhantomData,
        }
    }
}

impl<D: Digest> Default for SourceHashKeyGenerator<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Digest> KeyGenerator for SourceHashKeyGenerator<D>
where
    Output<D>: LowerHex,
{
    fn key(&self, params: &Params) -> String {
        let source = params.get("source").map(|v| v.to_string()).unwrap_or_default();
        hex_digest::<D>(source.as_bytes())
    }
}

/// A [`KeyGenerator`] backed by a closure.
pub struct KeyGeneratorFunc<F>(pub F);

impl<F> KeyGenerator for KeyGeneratorFunc<F>
where
    F: Fn(&Params) -> String + Send + Sync,
{
    fn key(&self, params: &Params) -> String {
        (self.0)(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::Sha512;

    fn request() -> Params {
        Params::new().with("source", "a.jpg").with("width", 100)
    }

    #[test]
    fn params_key_is_sha256_of_canonical_form() {
        let key = ParamsHashKeyGenerator::<Sha256>::new().key(&request());
        assert_eq!(request().to_string(), "map[source:a.jpg width:100]");
        assert_eq!(
            key,
            "f01664211f3dae95d74e8bd7ce7189824b4f91c8cbe10b102c0f538c49b30edc"
        );
    }

    #[test]
    fn hex_digest_is_lower_case_and_zero_padded() {
        assert_eq!(
            hex_digest::<Sha256>(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        // Leading zero nibbles must survive.
        assert!(hex_digest::<Sha256>(b"").starts_with("e3b0c442"));
    }

    #[test]
    fn params_key_ignores_insertion_order() {
        let keys = ParamsHashKeyGenerator::<Sha256>::new();
        let reordered = Params::new().with("width", 100).with("source", "a.jpg");
        assert_eq!(keys.key(&request()), keys.key(&reordered));
    }

    #[test]
    fn params_key_differs_per_descriptor() {
        let keys = ParamsHashKeyGenerator::<Sha256>::new();
        let other = request().with("width", 101);
        assert_ne!(keys.key(&request()), keys.key(&other));
    }

    #[test]
    fn hash_function_is_pluggable() {
        let key = ParamsHashKeyGenerator::<Sha512>::new().key(&request());
        assert_eq!(key.len(), 128);
        assert!(key.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()));
    }

    #[test]
    fn source_key_ignores_transform_params() {
        let keys = SourceHashKeyGenerator::<Sha256>::new();
        assert_eq!(keys.key(&request()), keys.key(&request().with("width", 5)));
        assert_eq!(
            keys.key(&request()),
            "509b0d4641a7c3ba088ffa28559d1f57207ea980447bc1773b1d406d788386ee"
        );
    }

    #[test]
    fn func_adapter() {
        let keys = KeyGeneratorFunc(|p: &Params| format!("k{}", p.len()));
        assert_eq!(keys.key(&request()), "k2");
    }
}
