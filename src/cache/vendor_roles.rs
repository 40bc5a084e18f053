use crate::error::{Result, ScanError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartyRole {
    Supplier,
    Buyer,
}

impl PartyRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartyRole::Supplier => "supplier",
            PartyRole::Buyer => "buyer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "supplier" | "seller" => Some(PartyRole::Supplier),
            "buyer" => Some(PartyRole::Buyer),
            _ => None,
        }
    }
}

impl fmt::Display for PartyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What earlier documents taught us about one tax ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorProfile {
    #[serde(default)]
    pub display_name: String,
    pub role: PartyRole,
}

impl VendorProfile {
    pub fn new(display_name: impl Into<String>, role: PartyRole) -> Self {
        Self {
            display_name: display_name.into(),
            role,
        }
    }
}

/// Tax ID → role store shared by every document in a run. Writes are last-writer-wins;
/// a lost or failed write only costs a heuristic re-evaluation next time.
pub trait VendorRoleCache: Send + Sync {
    fn lookup(&self, tax_id: &str) -> Option<VendorProfile>;
    fn remember(&self, tax_id: &str, profile: VendorProfile) -> Result<()>;
}

/// Process-local cache, used when no SQLite store is configured and in tests.
#[derive(Debug, Default)]
pub struct InMemoryVendorRoles {
    entries: RwLock<HashMap<String, VendorProfile>>,
}

impl InMemoryVendorRoles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut guard) = self.entries.write() {
            guard.clear();
        }
    }
}

impl VendorRoleCache for InMemoryVendorRoles {
    fn lookup(&self, tax_id: &str) -> Option<VendorProfile> {
        let guard = self.entries.read().ok()?;
        guard.get(tax_id).cloned()
    }

    fn remember(&self, tax_id: &str, profile: VendorProfile) -> Result<()> {
        let mut guard = self.entries.write().map_err(|_| ScanError::CachePoisoned)?;
        guard.insert(tax_id.to_string(), profile);
        Ok(())
    }
}

/// A cache that never knows anything. Lets callers run without cross-document state.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoVendorRoles;

impl VendorRoleCache for NoVendorRoles {
    fn lookup(&self, _tax_id: &str) -> Option<VendorProfile> {
        None
    }

    fn remember(&self, _tax_id: &str, _profile: VendorProfile) -> Result<()> {
        Ok(())
    }
}
