use crate::cpl::CslStringList;
use crate::errors::Result;

/// Metadata domain holding the geolocation array description.
pub const GEOLOCATION_DOMAIN: &str = "GEOLOCATION";

/// Access to `KEY=VALUE` metadata organised in named domains.
///
/// The default domain is the empty string.
pub trait Metadata {
    /// All items of `domain`, `None` when the domain does not exist.
    fn metadata_domain(&self, domain: &str) -> Option<&CslStringList>;

    /// Replaces the content of `domain`.
    fn set_metadata_domain(&mut self, domain: &str, metadata: CslStringList);

    /// Names of the non-empty domains.
    fn metadata_domains(&self) -> Vec<String>;

    fn metadata_item(&self, key: &str, domain: &str) -> Option<String> {
        self.metadata_domain(domain)
            .and_then(|items| items.fetch_name_value(key))
    }

    fn set_metadata_item(&mut self, key: &str, value: &str, domain: &str) -> Result<()> {
        let mut items = self
            .metadata_domain(domain)
            .cloned()
            .unwrap_or_default();
        items.set_name_value(key, value)?;
        self.set_metadata_domain(domain, items);
        Ok(())
    }
}
