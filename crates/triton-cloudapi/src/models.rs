//! CloudAPI resource models.

use crate::poller::Stateful;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::net::IpAddr;
use triton_core::uuid::{
    ComputeNodeUuid, ImageUuid, InstanceUuid, NetworkUuid, OwnerUuid, PackageUuid,
};
use triton_core::{Error, ErrorDetail};

/// Well-known instance states.
pub mod state {
    /// Instance is being created
    pub const PROVISIONING: &str = "provisioning";
    /// Instance is up
    pub const RUNNING: &str = "running";
    /// Instance is shutting down
    pub const STOPPING: &str = "stopping";
    /// Instance is stopped
    pub const STOPPED: &str = "stopped";
    /// Instance has been destroyed
    pub const DELETED: &str = "deleted";
    /// Provisioning failed
    pub const FAILED: &str = "failed";
}

/// Compute instance (machine) as returned by CloudAPI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instance {
    /// Instance UUID.
    pub id: InstanceUuid,
    /// Instance name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Brand (joyent, kvm, bhyve, lx).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    /// Current state, see [`state`].
    #[serde(default)]
    pub state: String,
    /// Image the instance was provisioned from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageUuid>,
    /// All IP addresses.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ips: Vec<IpAddr>,
    /// Memory in MiB.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<u64>,
    /// Disk in MiB.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk: Option<u64>,
    /// Customer metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
    /// Tags.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, Value>,
    /// Creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    /// Last update time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
    /// Attached networks.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<NetworkUuid>,
    /// Primary IP address.
    #[serde(rename = "primaryIp", default, skip_serializing_if = "Option::is_none")]
    pub primary_ip: Option<IpAddr>,
    /// Whether the cloud firewall is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firewall_enabled: Option<bool>,
    /// Compute node hosting the instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compute_node: Option<ComputeNodeUuid>,
    /// Package name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    /// DNS names assigned by CNS.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dns_names: Vec<String>,
}

impl Instance {
    /// Unique non-public addresses of the instance, in listing order.
    ///
    /// Covers unspecified, loopback, link-local, RFC 1918, site-local and
    /// unique-local addresses.
    #[must_use]
    pub fn private_ips(&self) -> Vec<IpAddr> {
        let mut private: Vec<IpAddr> = Vec::new();
        for ip in self.ips.iter().copied().filter(is_private_ip) {
            if !private.contains(&ip) {
                private.push(ip);
            }
        }
        private
    }

    /// Returns true if the instance reports the given state.
    #[must_use]
    pub fn is_in_state(&self, state: &str) -> bool {
        self.state == state
    }
}

fn is_private_ip(ip: &IpAddr) -> bool {
    if ip.is_unspecified() || ip.is_loopback() {
        return true;
    }
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_link_local(),
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            // fe80::/10 link-local, fec0::/10 site-local, fc00::/7 unique local
            (first & 0xffc0) == 0xfe80 || (first & 0xffc0) == 0xfec0 || (first & 0xfe00) == 0xfc00
        }
    }
}

impl Stateful for Instance {
    type Id = InstanceUuid;

    fn entity_id(&self) -> &InstanceUuid {
        &self.id
    }

    fn state(&self) -> &str {
        &self.state
    }
}

/// Placement hints for a new instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Locality {
    /// Fail provisioning if the hints cannot be honoured.
    #[serde(default)]
    pub strict: bool,
    /// Place near these instances.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub near: Vec<InstanceUuid>,
    /// Place away from these instances.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub far: Vec<InstanceUuid>,
}

/// Request body for creating an instance.
///
/// Tags and metadata are sent as flat `tag.{name}` and `metadata.{name}`
/// attributes.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CreateInstanceRequest {
    /// Package to size the instance with.
    pub package: PackageUuid,
    /// Image to provision from.
    pub image: ImageUuid,
    /// Instance name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Networks to attach.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<NetworkUuid>,
    /// Placement hints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locality: Option<Locality>,
    /// Enable the cloud firewall.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firewall_enabled: Option<bool>,
    /// Tags to set.
    #[serde(skip)]
    pub tags: BTreeMap<String, String>,
    /// Metadata to set.
    #[serde(skip)]
    pub metadata: BTreeMap<String, String>,
}

impl CreateInstanceRequest {
    /// Request for an instance of `package` running `image`.
    #[must_use]
    pub fn new(package: PackageUuid, image: ImageUuid) -> Self {
        Self {
            package,
            image,
            name: None,
            networks: Vec::new(),
            locality: None,
            firewall_enabled: None,
            tags: BTreeMap::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Set the instance name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attach a network.
    #[must_use]
    pub fn with_network(mut self, network: NetworkUuid) -> Self {
        self.networks.push(network);
        self
    }

    /// Set placement hints.
    #[must_use]
    pub fn with_locality(mut self, locality: Locality) -> Self {
        self.locality = Some(locality);
        self
    }

    /// Enable or disable the cloud firewall.
    #[must_use]
    pub const fn with_firewall(mut self, enabled: bool) -> Self {
        self.firewall_enabled = Some(enabled);
        self
    }

    /// Add a tag.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Add a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Build the JSON body with tags and metadata flattened.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidArgument` error for an empty tag or metadata key.
    pub fn to_body(&self) -> Result<Value> {
        let mut body = match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            Ok(_) => Map::new(),
            Err(err) => {
                return Err(Error::invalid_argument(format!(
                    "Failed to encode create instance request: {err}"
                )))
            }
        };

        flatten_into(&mut body, "tag", &self.tags)?;
        flatten_into(&mut body, "metadata", &self.metadata)?;
        Ok(Value::Object(body))
    }
}

fn flatten_into(
    body: &mut Map<String, Value>,
    prefix: &str,
    entries: &BTreeMap<String, String>,
) -> Result<()> {
    for (key, value) in entries {
        if key.trim().is_empty() {
            return Err(Error::invalid_argument(format!("Empty {prefix} key")));
        }
        body.insert(format!("{prefix}.{key}"), Value::String(value.clone()));
    }
    Ok(())
}

/// File backing an image.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageFile {
    /// Compression of the file (bzip2, gzip, none).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression: Option<String>,
    /// SHA-1 of the file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    /// Size in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// Image as returned by CloudAPI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Image {
    /// Image UUID.
    pub id: ImageUuid,
    /// Image name.
    #[serde(default)]
    pub name: String,
    /// Operating system.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    /// Image version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Image type (zone-dataset, lx-dataset, zvol, docker).
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub image_type: Option<String>,
    /// Provisioning requirements.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requirements: BTreeMap<String, Value>,
    /// Homepage URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Files making up the image.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<ImageFile>,
    /// Publication time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    /// Owning account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<OwnerUuid>,
    /// Whether the image is public.
    #[serde(rename = "public", default)]
    pub publicly_available: bool,
    /// Image state (active, unactivated, disabled, creating, failed).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Tags.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, Value>,
    /// EULA URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eula: Option<String>,
    /// Accounts given access to a private image.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub acl: Vec<OwnerUuid>,
    /// Failure detail for images in the `failed` state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

/// Package (instance sizing template) as returned by CloudAPI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Package {
    /// Package UUID.
    pub id: PackageUuid,
    /// Package name.
    #[serde(default)]
    pub name: String,
    /// Memory in MiB.
    #[serde(default)]
    pub memory: u64,
    /// Disk in MiB.
    #[serde(default)]
    pub disk: u64,
    /// Swap in MiB.
    #[serde(default)]
    pub swap: u64,
    /// Virtual CPUs (bhyve/kvm only).
    #[serde(default)]
    pub vcpus: u32,
    /// Maximum number of lightweight processes.
    #[serde(default)]
    pub lwps: u64,
    /// Package version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Package group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether this is the default package.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<bool>,
}
