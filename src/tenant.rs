//! Tenant extraction from domain metadata.
//!
//! Domains provisioned by the portfolio tooling carry a metadata element
//! like the following under the instance namespace:
//!
//! ```xml
//! <instance xmlns="http://portfolio.org/virtualization/instance">
//!   <tenant>
//!     <uuid>43dc0cf8-809b-4adb-9bea-a9abb5f3d90e</uuid>
//!   </tenant>
//! </instance>
//! ```
//!
//! Elements are matched by local name, so any namespace prefix works.

use tracing::debug;

/// Default namespace of the instance metadata element.
pub const DEFAULT_TENANT_NAMESPACE: &str = "http://portfolio.org/virtualization/instance";

/// Returns the trimmed text of `<tenant><uuid>…</uuid></tenant>`, if present.
pub fn extract_tenant(xml: &str) -> Option<String> {
    let doc = match roxmltree::Document::parse(xml) {
        Ok(doc) => doc,
        Err(e) => {
            debug!("Unparsable domain metadata: {}", e);
            return None;
        }
    };

    doc.descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "tenant")
        .flat_map(|tenant| tenant.children())
        .find(|n| n.is_element() && n.tag_name().name() == "uuid")
        .and_then(|uuid| uuid.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_tenant_uuid() {
        let xml = r#"<instance xmlns="http://portfolio.org/virtualization/instance">
<tenant>
<uuid>43dc0cf8-809b-4adb-9bea-a9abb5f3d90e</uuid>
</tenant>
</instance>"#;
        assert_eq!(
            extract_tenant(xml).as_deref(),
            Some("43dc0cf8-809b-4adb-9bea-a9abb5f3d90e")
        );
    }

    #[test]
    fn test_independent_of_layout_and_prefix() {
        let xml = r#"<p:instance xmlns:p="urn:x"><p:owner>ops</p:owner><p:tenant><p:uuid>  t-1  </p:uuid></p:tenant></p:instance>"#;
        assert_eq!(extract_tenant(xml).as_deref(), Some("t-1"));
    }

    #[test]
    fn test_uuid_outside_tenant_is_ignored() {
        let xml = "<instance><uuid>not-a-tenant</uuid><tenant/></instance>";
        assert_eq!(extract_tenant(xml), None);
    }

    #[test]
    fn test_missing_or_empty_tenant() {
        assert_eq!(extract_tenant("<instance/>"), None);
        assert_eq!(extract_tenant("<instance><tenant><uuid></uuid></tenant></instance>"), None);
    }

    #[test]
    fn test_malformed_xml() {
        assert_eq!(extract_tenant("<instance><tenant>"), None);
        assert_eq!(extract_tenant(""), None);
    }
}
