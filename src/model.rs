//! Server and Client records.
//!
//! Field names serialize in the camelCase shape API callers already send, so
//! records can be passed through from the HTTP layer without remapping.

use std::net::IpAddr;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::cidr;
use crate::error::{Error, Result};

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .unwrap_or_else(|error| panic!("email pattern is a valid regex: {}", error))
});

const NAME_MIN_CHARS: usize = 2;
const NAME_MAX_CHARS: usize = 40;
const MIN_MTU: u16 = 576;

fn valid_port(port: u32) -> bool {
    (1..=65535).contains(&port)
}

fn check_cidrs(errors: &mut Vec<String>, field: &str, entries: &[String]) {
    for entry in entries {
        if !cidr::is_valid(entry) {
            errors.push(format!("{} {} is invalid", field, entry));
        }
    }
}

/// Rendered values must stay on one config line.
fn check_line(errors: &mut Vec<String>, field: &str, value: &str) {
    if value.chars().any(char::is_control) {
        errors.push(format!("{} must not contain control characters", field));
    }
}

fn check_lines(errors: &mut Vec<String>, field: &str, values: &[String]) {
    for value in values {
        check_line(errors, field, value);
    }
}

fn into_result(errors: Vec<String>) -> Result<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::InvalidInput(errors))
    }
}

/// The singleton server record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Server {
    pub address: Vec<String>,
    pub listen_port: u16,
    pub mtu: u16,
    pub private_key: String,
    pub public_key: String,
    pub endpoint: String,
    pub persistent_keepalive: u16,
    pub dns: Vec<String>,
    #[serde(rename = "allowedIPs")]
    pub allowed_ips: Vec<String>,
    pub table: String,
    pub updated_by: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Server {
    /// Checks every field and reports all failures together.
    ///
    /// Key material is not checked: an update always carries the stored pair.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.address.is_empty() {
            errors.push("address field is required".to_string());
        }
        check_cidrs(&mut errors, "address", &self.address);

        if self.listen_port == 0 {
            errors.push("listenPort must be between 1 and 65535".to_string());
        }

        if self.endpoint.trim().is_empty() {
            errors.push("endpoint is required".to_string());
        }

        for dns in &self.dns {
            if dns.trim().parse::<IpAddr>().is_err() {
                errors.push(format!("dns {} is invalid", dns));
            }
        }

        check_cidrs(&mut errors, "allowedIP", &self.allowed_ips);

        if self.mtu != 0 && self.mtu < MIN_MTU {
            errors.push(format!("mtu {} is below {}", self.mtu, MIN_MTU));
        }

        check_lines(&mut errors, "address", &self.address);
        check_line(&mut errors, "endpoint", &self.endpoint);
        check_lines(&mut errors, "dns", &self.dns);
        check_lines(&mut errors, "allowedIPs", &self.allowed_ips);
        check_line(&mut errors, "table", &self.table);
        check_line(&mut errors, "privateKey", &self.private_key);
        check_line(&mut errors, "publicKey", &self.public_key);

        into_result(errors)
    }
}

/// One peer of the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Client {
    pub id: String,
    pub name: String,
    pub email: String,
    pub enable: bool,
    #[serde(rename = "site2site")]
    pub site2site: bool,
    pub ignore_persistent_keepalive: bool,
    pub keepalive_disabled: bool,
    pub keepalive_interval: u32,
    #[serde(rename = "useRemoteDNS")]
    pub use_remote_dns: bool,
    #[serde(rename = "site2siteEndpointOptionsEnabled")]
    pub site2site_endpoint_options_enabled: bool,
    #[serde(rename = "site2SiteEndpoint")]
    pub site2site_endpoint: String,
    #[serde(rename = "site2SiteEndpointPort")]
    pub site2site_endpoint_port: u32,
    #[serde(rename = "site2SiteEndpointListenPort")]
    pub site2site_endpoint_listen_port: u32,
    #[serde(rename = "lanIPs")]
    pub lan_ips: Vec<String>,
    pub table: String,
    pub preshared_key: String,
    #[serde(rename = "allowedIPs")]
    pub allowed_ips: Vec<String>,
    pub address: Vec<String>,
    pub tags: Vec<String>,
    pub private_key: String,
    pub public_key: String,
    pub created_by: String,
    pub updated_by: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Client {
    /// Checks every field and reports all failures together.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        let name_chars = self.name.chars().count();
        if self.name.is_empty() {
            errors.push("name is required".to_string());
        }
        if !(NAME_MIN_CHARS..=NAME_MAX_CHARS).contains(&name_chars) {
            errors.push(format!(
                "name field must be between {}-{} chars",
                NAME_MIN_CHARS, NAME_MAX_CHARS
            ));
        }

        if !self.email.is_empty() && !EMAIL.is_match(&self.email) {
            errors.push(format!("email {} is invalid", self.email));
        }

        if self.site2site && self.lan_ips.is_empty() {
            errors.push("lanIPs are required when site2site is enabled".to_string());
        }
        check_cidrs(&mut errors, "lanIP", &self.lan_ips);

        if self.site2site_endpoint.is_empty() {
            if self.site2site_endpoint_port != 0 {
                errors.push(
                    "site2SiteEndpointPort must be unset when site2SiteEndpoint is empty"
                        .to_string(),
                );
            }
            if self.site2site_endpoint_listen_port != 0 {
                errors.push(
                    "site2SiteEndpointListenPort must be unset when site2SiteEndpoint is empty"
                        .to_string(),
                );
            }
        } else {
            if !valid_port(self.site2site_endpoint_listen_port) {
                errors.push(format!(
                    "site2SiteEndpointListenPort {} is invalid",
                    self.site2site_endpoint_listen_port
                ));
            }
            if self.site2site_endpoint_port != 0 && !valid_port(self.site2site_endpoint_port) {
                errors.push(format!(
                    "site2SiteEndpointPort {} is invalid",
                    self.site2site_endpoint_port
                ));
            }
        }

        if self.ignore_persistent_keepalive
            && !self.keepalive_disabled
            && self.keepalive_interval == 0
        {
            errors.push(
                "keepaliveInterval must be a positive integer when ignorePersistentKeepalive is set and keepalive is not disabled"
                    .to_string(),
            );
        }

        if self.allowed_ips.is_empty() {
            errors.push("allowedIPs field is required".to_string());
        }
        check_cidrs(&mut errors, "allowedIP", &self.allowed_ips);

        if self.address.is_empty() {
            errors.push("address field is required".to_string());
        }
        check_cidrs(&mut errors, "address", &self.address);

        check_line(&mut errors, "name", &self.name);
        check_line(&mut errors, "email", &self.email);
        check_line(&mut errors, "site2SiteEndpoint", &self.site2site_endpoint);
        check_line(&mut errors, "table", &self.table);
        check_line(&mut errors, "privateKey", &self.private_key);
        check_line(&mut errors, "publicKey", &self.public_key);
        check_line(&mut errors, "presharedKey", &self.preshared_key);
        check_lines(&mut errors, "lanIPs", &self.lan_ips);
        check_lines(&mut errors, "allowedIPs", &self.allowed_ips);
        check_lines(&mut errors, "address", &self.address);

        into_result(errors)
    }
}
