//! Listing filters encoded as query parameters.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use triton_core::query::QueryParams;
use triton_core::uuid::{ImageUuid, OwnerUuid};

/// Filter for listing instances.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstanceFilter {
    /// Brand (joyent, kvm, bhyve, lx).
    pub brand: Option<String>,
    /// Instance name.
    pub name: Option<String>,
    /// Image the instances were provisioned from.
    pub image: Option<ImageUuid>,
    /// Instance state.
    pub state: Option<String>,
    /// Memory in MiB.
    pub memory: Option<u64>,
    /// Include instances destroyed within this many minutes.
    pub tombstone: Option<u32>,
    /// Maximum number of results.
    pub limit: Option<u32>,
    /// Offset into the result set.
    pub offset: Option<u32>,
    /// Only Docker instances.
    pub docker: Option<bool>,
    /// Include generated credentials in the metadata.
    pub credentials: Option<bool>,
    /// Tags that must match, sent as `tag.{name}`.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl InstanceFilter {
    /// Empty filter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Match on state.
    #[must_use]
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    /// Match on name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Match on brand.
    #[must_use]
    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = Some(brand.into());
        self
    }

    /// Match on image.
    #[must_use]
    pub const fn with_image(mut self, image: ImageUuid) -> Self {
        self.image = Some(image);
        self
    }

    /// Match on memory size.
    #[must_use]
    pub const fn with_memory(mut self, memory: u64) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Limit the number of results.
    #[must_use]
    pub const fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip the first `offset` results.
    #[must_use]
    pub const fn with_offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Match on a tag.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Query parameter pairs for this filter.
    #[must_use]
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut params = QueryParams::new();
        params.push_opt("brand", self.brand.as_ref());
        params.push_opt("name", self.name.as_ref());
        params.push_opt("image", self.image);
        params.push_opt("state", self.state.as_ref());
        params.push_opt("memory", self.memory);
        params.push_opt("tombstone", self.tombstone);
        params.push_opt("limit", self.limit);
        params.push_opt("offset", self.offset);
        params.push_opt("docker", self.docker);
        params.push_opt("credentials", self.credentials);
        params.push_prefixed("tag.", &self.tags);
        params.into_pairs()
    }
}

/// Filter for listing images.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageFilter {
    /// Image name.
    pub name: Option<String>,
    /// Operating system.
    pub os: Option<String>,
    /// Image version.
    pub version: Option<String>,
    /// Public or private images only.
    pub public: Option<bool>,
    /// Image state.
    pub state: Option<String>,
    /// Owning account.
    pub owner: Option<OwnerUuid>,
    /// Image type.
    pub image_type: Option<String>,
}

impl ImageFilter {
    /// Query parameter pairs for this filter.
    #[must_use]
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut params = QueryParams::new();
        params.push_opt("name", self.name.as_ref());
        params.push_opt("os", self.os.as_ref());
        params.push_opt("version", self.version.as_ref());
        params.push_opt("public", self.public);
        params.push_opt("state", self.state.as_ref());
        params.push_opt("owner", self.owner);
        params.push_opt("type", self.image_type.as_ref());
        params.into_pairs()
    }
}

/// Filter for listing packages.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackageFilter {
    /// Package name.
    pub name: Option<String>,
    /// Memory in MiB.
    pub memory: Option<u64>,
    /// Disk in MiB.
    pub disk: Option<u64>,
    /// Swap in MiB.
    pub swap: Option<u64>,
    /// Maximum lightweight processes.
    pub lwps: Option<u64>,
    /// Virtual CPUs.
    pub vcpus: Option<u32>,
    /// Package version.
    pub version: Option<String>,
    /// Package group.
    pub group: Option<String>,
}

impl PackageFilter {
    /// Query parameter pairs for this filter.
    #[must_use]
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut params = QueryParams::new();
        params.push_opt("name", self.name.as_ref());
        params.push_opt("memory", self.memory);
        params.push_opt("disk", self.disk);
        params.push_opt("swap", self.swap);
        params.push_opt("lwps", self.lwps);
        params.push_opt("vcpus", self.vcpus);
        params.push_opt("version", self.version.as_ref());
        params.push_opt("group", self.group.as_ref());
        params.into_pairs()
    }
}
