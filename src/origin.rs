//! Origin identity and addressing.
//!
//! An [`Origin`] is a single backend server instance belonging to a backend
//! application. Origins are immutable values; a changed definition is a new
//! origin that replaces the old one in the inventory.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Arc<str>);

        impl $name {
            pub fn new(id: impl AsRef<str>) -> Self {
                Self(Arc::from(id.as_ref()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self::new(id)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(Arc::from(id))
            }
        }
    };
}

string_id! {
    /// Identifier of a backend application (a named group of origins).
    AppId
}

string_id! {
    /// Identifier of an origin, unique within its application.
    OriginId
}

/// TLS settings attached to an origin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct TlsSettings {
    /// Skip certificate verification.
    #[serde(default)]
    pub trust_all_certs: bool,
    /// SNI host name override.
    #[serde(default)]
    pub sni_host: Option<String>,
}

/// A single backend server instance.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Origin {
    inner: Arc<OriginInner>,
}

#[derive(PartialEq, Eq, Hash)]
struct OriginInner {
    app_id: AppId,
    id: OriginId,
    host: String,
    port: u16,
    tls: Option<TlsSettings>,
}

impl Origin {
    pub fn new(app_id: impl Into<AppId>, id: impl Into<OriginId>, host: impl Into<String>, port: u16) -> Self {
        Self {
            inner: Arc::new(OriginInner {
                app_id: app_id.into(),
                id: id.into(),
                host: host.into(),
                port,
                tls: None,
            }),
        }
    }

    /// Parse an origin from a `host:port` address.
    pub fn from_address(
        app_id: impl Into<AppId>,
        id: impl Into<OriginId>,
        address: &str,
    ) -> Result<Self, InvalidAddress> {
        let (host, port) = address
            .rsplit_once(':')
            .ok_or_else(|| InvalidAddress(address.to_string()))?;
        let port: u16 = port.parse().map_err(|_| InvalidAddress(address.to_string()))?;
        if host.is_empty() {
            return Err(InvalidAddress(address.to_string()));
        }
        Ok(Self::new(app_id, id, host, port))
    }

    /// Returns a copy of this origin carrying the given TLS settings.
    pub fn with_tls(self, tls: Option<TlsSettings>) -> Self {
        let inner = OriginInner {
            app_id: self.inner.app_id.clone(),
            id: self.inner.id.clone(),
            host: self.inner.host.clone(),
            port: self.inner.port,
            tls,
        };
        Self { inner: Arc::new(inner) }
    }

    pub fn app_id(&self) -> &AppId {
        &self.inner.app_id
    }

    pub fn id(&self) -> &OriginId {
        &self.inner.id
    }

    pub fn host(&self) -> &str {
        &self.inner.host
    }

    pub fn port(&self) -> u16 {
        self.inner.port
    }

    pub fn tls(&self) -> Option<&TlsSettings> {
        self.inner.tls.as_ref()
    }

    pub fn host_and_port(&self) -> String {
        format!("{}:{}", self.inner.host, self.inner.port)
    }
}

impl fmt::Debug for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Origin")
            .field("app_id", &self.inner.app_id)
            .field("id", &self.inner.id)
            .field("address", &self.host_and_port())
            .field("tls", &self.inner.tls.is_some())
            .finish()
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.inner.app_id, self.inner.id, self.host_and_port())
    }
}

/// An origin address that is not `host:port`.
#[derive(Debug, thiserror::Error)]
#[error("invalid origin address '{0}', expected host:port")]
pub struct InvalidAddress(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_and_port() {
        let origin = Origin::from_address("shop", "shop-01", "localhost:9090").unwrap();
        assert_eq!(origin.host(), "localhost");
        assert_eq!(origin.port(), 9090);
        assert_eq!(origin.host_and_port(), "localhost:9090");
        assert_eq!(origin.to_string(), "shop:shop-01:localhost:9090");
    }

    #[test]
    fn rejects_address_without_port() {
        assert!(Origin::from_address("shop", "shop-01", "localhost").is_err());
        assert!(Origin::from_address("shop", "shop-01", ":80").is_err());
        assert!(Origin::from_address("shop", "shop-01", "host:http").is_err());
    }

    #[test]
    fn equality_covers_definition() {
        let a = Origin::new("shop", "shop-01", "localhost", 9090);
        let b = Origin::new("shop", "shop-01", "localhost", 9090);
        let c = Origin::new("shop", "shop-01", "localhost", 9091);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, a.clone().with_tls(Some(TlsSettings::default())));
    }
}
