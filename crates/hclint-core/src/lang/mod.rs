//! Terraform language semantics on top of the content model: what an
//! expression refers to and which providers a module uses.

mod providers;
mod references;

pub use providers::{decode_provider_ref, get_provider_refs, ProviderRef};
pub use references::{parse_ref, references_in_expr, references_with_ranges, Reference};
