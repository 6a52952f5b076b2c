use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Storage backends the transfer service can mirror an artifact into.
///
/// The declaration order is the display order everywhere a provider list is
/// shown, independent of which identifier the backend happened to fill first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    R2,
    Pixeldrain,
    Idrive,
    Vikingfile,
}

impl Provider {
    pub const ALL: [Provider; 4] = [
        Provider::R2,
        Provider::Pixeldrain,
        Provider::Idrive,
        Provider::Vikingfile,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Provider::R2 => "r2",
            Provider::Pixeldrain => "pixeldrain",
            Provider::Idrive => "idrive",
            Provider::Vikingfile => "vikingfile",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Provider::R2 => "Cloudflare R2",
            Provider::Pixeldrain => "Pixeldrain",
            Provider::Idrive => "IDrive e2",
            Provider::Vikingfile => "VikingFile",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|provider| provider.as_str().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A provider name as it appears in backend data.
///
/// Names outside the known set are kept so they can still be listed under a
/// generic label, but nothing can be dispatched for them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProviderName {
    Known(Provider),
    Other(String),
}

impl ProviderName {
    pub fn as_str(&self) -> &str {
        match self {
            ProviderName::Known(provider) => provider.as_str(),
            ProviderName::Other(name) => name,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            ProviderName::Known(provider) => provider.label(),
            ProviderName::Other(name) => name,
        }
    }

    pub fn known(&self) -> Option<Provider> {
        match self {
            ProviderName::Known(provider) => Some(*provider),
            ProviderName::Other(_) => None,
        }
    }
}

impl From<Provider> for ProviderName {
    fn from(provider: Provider) -> Self {
        ProviderName::Known(provider)
    }
}

impl From<&str> for ProviderName {
    fn from(raw: &str) -> Self {
        match Provider::from_name(raw) {
            Some(provider) => ProviderName::Known(provider),
            None => ProviderName::Other(raw.to_string()),
        }
    }
}

impl FromStr for ProviderName {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ProviderName::from(s))
    }
}

impl fmt::Display for ProviderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ProviderName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ProviderName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(ProviderName::from(raw.as_str()))
    }
}
