use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt::{self, Debug};
use std::hash::BuildHasher;

use sha2::{Digest, Sha256};

/// Types that can identify a cache instance.
///
/// `key_material` renders the value into the string that gets digested. Collections
/// are sorted before rendering so that the same elements in a different order
/// produce the same material:
///
/// ```
/// use keystash_core::KeySource;
///
/// assert_eq!(vec!["b", "a"].key_material(), r#"["a", "b"]"#);
/// assert_eq!("stack-1".key_material(), "stack-1");
/// ```
///
/// Implement it directly for your own identifier types:
///
/// ```
/// use keystash_core::{CacheKey, KeySource};
///
/// struct StackId {
///     region: String,
///     name: String,
/// }
///
/// impl KeySource for StackId {
///     fn key_material(&self) -> String {
///         format!("{}/{}", self.region, self.name)
///     }
/// }
///
/// let id = StackId { region: "eu-west-1".into(), name: "web".into() };
/// assert_eq!(CacheKey::derive(&id), CacheKey::derive("eu-west-1/web"));
/// ```
pub trait KeySource {
    fn key_material(&self) -> String;
}

impl KeySource for str {
    fn key_material(&self) -> String {
        self.to_string()
    }
}

impl KeySource for String {
    fn key_material(&self) -> String {
        self.clone()
    }
}

impl<T: KeySource + ?Sized> KeySource for &T {
    fn key_material(&self) -> String {
        (**self).key_material()
    }
}

macro_rules! display_key_source {
    ($($t:ty),* $(,)?) => {
        $(
            impl KeySource for $t {
                fn key_material(&self) -> String {
                    self.to_string()
                }
            }
        )*
    };
}

display_key_source!(
    bool, char, f32, f64, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize
);

// Tuples are positional, so their elements keep their order.
macro_rules! tuple_key_source {
    ($($name:ident),+) => {
        impl<$($name: Debug),+> KeySource for ($($name,)+) {
            fn key_material(&self) -> String {
                format!("{:?}", self)
            }
        }
    };
}

tuple_key_source!(A);
tuple_key_source!(A, B);
tuple_key_source!(A, B, C);
tuple_key_source!(A, B, C, D);
tuple_key_source!(A, B, C, D, E);
tuple_key_source!(A, B, C, D, E, F);

fn sorted_material<'a, T, I>(items: I) -> String
where
    T: Ord + Debug + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let mut items: Vec<&T> = items.into_iter().collect();
    items.sort();
    format!("{:?}", items)
}

impl<T: Ord + Debug> KeySource for [T] {
    fn key_material(&self) -> String {
        sorted_material(self)
    }
}

impl<T: Ord + Debug> KeySource for Vec<T> {
    fn key_material(&self) -> String {
        sorted_material(self)
    }
}

impl<T: Ord + Debug, const N: usize> KeySource for [T; N] {
    fn key_material(&self) -> String {
        sorted_material(self)
    }
}

impl<T: Ord + Debug> KeySource for BTreeSet<T> {
    fn key_material(&self) -> String {
        sorted_material(self)
    }
}

impl<T: Ord + Debug, S: BuildHasher> KeySource for HashSet<T, S> {
    fn key_material(&self) -> String {
        sorted_material(self)
    }
}

impl<K: Ord + Debug, V: Debug> KeySource for BTreeMap<K, V> {
    fn key_material(&self) -> String {
        format!("{:?}", self.iter().collect::<Vec<_>>())
    }
}

impl<K: Ord + Debug, V: Debug, S: BuildHasher> KeySource for HashMap<K, V, S> {
    fn key_material(&self) -> String {
        let mut pairs: Vec<(&K, &V)> = self.iter().collect();
        pairs.sort_by(|a, b| a.0.cmp(b.0));
        format!("{:?}", pairs)
    }
}

/// Lowercase hex SHA-256 digest of a [`KeySource`]'s material.
///
/// Equal material gives an equal key in every process, which is what lets
/// separate processes share handles on the remote backend.
///
/// # Examples
///
/// ```
/// use keystash_core::CacheKey;
///
/// let a = CacheKey::derive(&vec!["us-east-1", "prod"]);
/// let b = CacheKey::derive(&vec!["prod", "us-east-1"]);
/// assert_eq!(a, b);
/// assert_eq!(a.as_str().len(), 64);
/// assert_eq!(a.qualify("stacks"), format!("{}_stacks", a));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Digests the material of `input`.
    pub fn derive<K: KeySource + ?Sized>(input: &K) -> Self {
        let digest = Sha256::digest(input.key_material().as_bytes());
        CacheKey(hex::encode(digest))
    }

    /// The 64-character lowercase hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Full name of a storage slot in this key's namespace: `<key>_<name>`.
    pub fn qualify(&self, name: &str) -> String {
        format!("{}_{}", self.0, name)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        assert_eq!(
            CacheKey::derive("abc").as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_tuples_keep_position() {
        assert_eq!(("eu", 1).key_material(), r#"("eu", 1)"#);
        assert_eq!(CacheKey::derive(&("eu", 1)), CacheKey::derive(r#"("eu", 1)"#));
        assert_ne!(CacheKey::derive(&(1, 2)), CacheKey::derive(&(2, 1)));
    }

    #[test]
    fn test_floats_render_like_display() {
        assert_eq!(CacheKey::derive(&1.5f64), CacheKey::derive("1.5"));
        assert_eq!(CacheKey::derive(&0.25f32), CacheKey::derive("0.25"));
    }

    #[test]
    fn test_string_and_str_agree() {
        let owned = String::from("stack");
        assert_eq!(CacheKey::derive(&owned), CacheKey::derive("stack"));
    }

    #[test]
    fn test_collections_are_permutation_invariant() {
        let a = CacheKey::derive(&vec![3, 1, 2]);
        let b = CacheKey::derive(&[2, 3, 1]);
        let c = CacheKey::derive(&BTreeSet::from([1, 2, 3]));
        let d = CacheKey::derive(&HashSet::from([2, 1, 3]));
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a, d);
    }

    #[test]
    fn test_maps_sort_by_key() {
        let mut hashed = HashMap::new();
        hashed.insert("region", "eu");
        hashed.insert("account", "42");
        let ordered = BTreeMap::from([("account", "42"), ("region", "eu")]);
        assert_eq!(hashed.key_material(), ordered.key_material());
        assert_eq!(
            ordered.key_material(),
            r#"[("account", "42"), ("region", "eu")]"#
        );
    }

    #[test]
    fn test_different_inputs_differ() {
        assert_ne!(CacheKey::derive("a"), CacheKey::derive("b"));
        assert_ne!(CacheKey::derive(&vec!["a", "b"]), CacheKey::derive("a b"));
    }

    #[test]
    fn test_numbers_use_display_form() {
        assert_eq!(42u32.key_material(), "42");
        assert_eq!(CacheKey::derive(&42u32), CacheKey::derive("42"));
    }

    #[test]
    fn test_qualify() {
        let key = CacheKey::derive("abc");
        assert_eq!(
            key.qualify("items"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad_items"
        );
    }
}
