use serde_derive::{Deserialize, Serialize};

use crate::{error::ConfigFileErrorKind, id::Id, CairnResult};

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
/// The config file describes all repository-wide information.
///
/// It is usually saved in the repository as `config`
pub struct ConfigFile {
    /// Repository version
    pub version: u32,

    /// The [`Id`] identifying the repository
    pub id: Id,

    /// The chunker polynomial used to chunk data
    pub chunker_polynomial: String,
}

impl ConfigFile {
    /// Creates a new `ConfigFile`.
    ///
    /// # Arguments
    ///
    /// * `version` - The version of the repository
    /// * `id` - The id of the repository
    /// * `poly` - The chunker polynomial
    #[must_use]
    pub fn new(version: u32, id: Id, poly: u64) -> Self {
        Self {
            version,
            id,
            chunker_polynomial: format!("{poly:x}"),
        }
    }

    /// Get the chunker polynomial
    ///
    /// # Errors
    ///
    /// * [`ConfigFileErrorKind::ParsingFailedForPolynomial`] - If the polynomial could not be parsed
    ///
    /// [`ConfigFileErrorKind::ParsingFailedForPolynomial`]: crate::error::ConfigFileErrorKind::ParsingFailedForPolynomial
    pub fn poly(&self) -> CairnResult<u64> {
        Ok(u64::from_str_radix(&self.chunker_polynomial, 16)
            .map_err(ConfigFileErrorKind::ParsingFailedForPolynomial)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poly_roundtrip_passes() {
        let config = ConfigFile::new(1, Id::random(), 0x3DA3358B4DC173);
        assert_eq!(config.poly().unwrap(), 0x3DA3358B4DC173);
    }

    #[test]
    fn test_invalid_poly_fails() {
        let config = ConfigFile {
            version: 1,
            id: Id::default(),
            chunker_polynomial: "not-hex".to_string(),
        };
        assert!(config.poly().is_err());
    }
}
