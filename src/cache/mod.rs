pub mod vendor_roles;

pub use vendor_roles::{InMemoryVendorRoles, NoVendorRoles, PartyRole, VendorProfile, VendorRoleCache};
