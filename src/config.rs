//! Security flavor selection.
//!
//! A flavor is chosen once, when a connection is set up, by name:
//!
//! | name    | flavor                                |
//! |---------|---------------------------------------|
//! | `none`  | `AUTH_NONE`                           |
//! | `sys`   | `AUTH_SYS`                            |
//! | `krb5`  | `RPCSEC_GSS`, authentication only     |
//! | `krb5i` | `RPCSEC_GSS`, integrity               |
//! | `krb5p` | `RPCSEC_GSS`, privacy                 |

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::anyhow;

use crate::error::{Error, Result};
use crate::protocol::auth::{AuthGss, AuthNone, AuthSys, GssProvider, SecurityFlavor, Service};
use crate::protocol::rpc::RpcClient;

/// `AUTH_SYS` credential contents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SysConfig {
    pub machine_name: String,
    pub uid: u32,
    pub gid: u32,
    pub gids: Vec<u32>,
}

impl Default for SysConfig {
    fn default() -> Self {
        Self { machine_name: "localhost".to_string(), uid: 0, gid: 0, gids: Vec::new() }
    }
}

/// `RPCSEC_GSS` target and service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GssConfig {
    /// Target principal, `service@host`
    pub target: String,
    pub service: Service,
}

impl GssConfig {
    /// The NFS service principal of `host`.
    pub fn for_host(host: &str, service: Service) -> Self {
        Self { target: format!("nfs@{host}"), service }
    }
}

impl Default for GssConfig {
    fn default() -> Self {
        Self::for_host("localhost", Service::None)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SecurityConfig {
    #[default]
    None,
    Sys(SysConfig),
    Gss(GssConfig),
}

/// The name is not one of the known flavors.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown security flavor: {0}")]
pub struct UnknownFlavor(pub String);

impl FromStr for SecurityConfig {
    type Err = UnknownFlavor;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let gss = |service| SecurityConfig::Gss(GssConfig { service, ..GssConfig::default() });
        match s.to_lowercase().as_str() {
            "none" => Ok(SecurityConfig::None),
            "sys" => Ok(SecurityConfig::Sys(SysConfig::default())),
            "krb5" => Ok(gss(Service::None)),
            "krb5i" => Ok(gss(Service::Integrity)),
            "krb5p" => Ok(gss(Service::Privacy)),
            _ => Err(UnknownFlavor(s.to_string())),
        }
    }
}

impl fmt::Display for SecurityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SecurityConfig::None => "none",
            SecurityConfig::Sys(_) => "sys",
            SecurityConfig::Gss(GssConfig { service: Service::None, .. }) => "krb5",
            SecurityConfig::Gss(GssConfig { service: Service::Integrity, .. }) => "krb5i",
            SecurityConfig::Gss(GssConfig { service: Service::Privacy, .. }) => "krb5p",
        };
        f.write_str(name)
    }
}

impl SecurityConfig {
    /// Builds a flavor that needs no GSS-API provider.
    pub fn build(&self) -> Result<Arc<dyn SecurityFlavor>> {
        match self {
            SecurityConfig::None => Ok(Arc::new(AuthNone)),
            SecurityConfig::Sys(sys) => {
                Ok(Arc::new(AuthSys::new(sys.machine_name.clone(), sys.uid, sys.gid, &sys.gids)?))
            }
            SecurityConfig::Gss(gss) => Err(Error::Provider(anyhow!(
                "{self} for {} requires a GSS-API provider",
                gss.target
            ))),
        }
    }

    /// Builds the flavor, handing `provider` to it if it is `RPCSEC_GSS`.
    pub fn build_with<P: GssProvider + 'static>(
        &self,
        provider: P,
    ) -> Result<Arc<dyn SecurityFlavor>> {
        match self {
            SecurityConfig::Gss(gss) => {
                Ok(Arc::new(AuthGss::new(provider, &gss.target, gss.service)?))
            }
            _ => self.build(),
        }
    }
}

/// Program, version and security of one RPC client.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClientConfig {
    pub program: u32,
    pub version: u32,
    pub security: SecurityConfig,
}

impl ClientConfig {
    pub fn client(&self) -> Result<RpcClient> {
        Ok(RpcClient::new(self.program, self.version, self.security.build()?))
    }

    pub fn client_with<P: GssProvider + 'static>(&self, provider: P) -> Result<RpcClient> {
        Ok(RpcClient::new(self.program, self.version, self.security.build_with(provider)?))
    }
}
