use crate::model::{Requester, Scope};
use crate::types::BuildUri;

// URL part for the build summary view, used for completed builds.
const SUMMARY_PART: &str = "/_build#_a=summary&buildId=";

// URL part for the live log view, used while a build is in progress.
const LOG_PART: &str = "/_build#_a=log&buildUri=";

/// Builds dashboard-facing report and avatar URLs. Pure construction; no
/// network validation happens here.
pub trait ReportUrlBuilder: Send + Sync {
    fn report_url(&self, scope: &Scope, build_uri: &BuildUri, summary: bool) -> String;
    fn avatar_url(&self, scope: &Scope, requester: &Requester) -> String;
}

pub struct DashboardUrls {
    base: String,
    /// The hosted service always routes through its default collection; the
    /// on-premises grammar uses whichever collection the scope belongs to.
    fixed_collection: Option<String>,
}

impl DashboardUrls {
    pub fn hosted(base_url: &str) -> Self {
        Self {
            base: base_url.trim_end_matches('/').to_string(),
            fixed_collection: Some("DefaultCollection".to_string()),
        }
    }

    pub fn onprem(base_url: &str) -> Self {
        Self {
            base: base_url.trim_end_matches('/').to_string(),
            fixed_collection: None,
        }
    }

    fn collection_segment(&self, scope: &Scope) -> String {
        let collection = self
            .fixed_collection
            .as_deref()
            .or(scope.collection.as_deref());
        match collection {
            Some(c) => format!("/{c}/"),
            None => "/".to_string(),
        }
    }
}

impl ReportUrlBuilder for DashboardUrls {
    fn report_url(&self, scope: &Scope, build_uri: &BuildUri, summary: bool) -> String {
        let prefix = format!("{}{}{}", self.base, self.collection_segment(scope), scope.name);
        if build_uri.as_str().is_empty() {
            return format!("{prefix}/_build");
        }
        let part = if summary { SUMMARY_PART } else { LOG_PART };
        format!("{prefix}{part}{}", build_uri.number())
    }

    fn avatar_url(&self, scope: &Scope, requester: &Requester) -> String {
        if let Some(image_url) = &requester.image_url {
            return format!("{image_url}&size=2");
        }
        // The identity-image endpoint resolves a display name to a picture
        // when the build payload carried no image URL.
        let identifier: String =
            url::form_urlencoded::byte_serialize(requester.display_name.as_bytes()).collect();
        format!(
            "{}{}_api/_common/IdentityImage?id=&identifier={identifier}",
            self.base,
            self.collection_segment(scope)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScopeId;

    fn scope(collection: Option<&str>) -> Scope {
        Scope {
            id: ScopeId::new("p1"),
            name: "web".into(),
            collection: collection.map(String::from),
        }
    }

    #[test]
    fn hosted_summary_url_routes_through_default_collection() {
        let urls = DashboardUrls::hosted("https://example.visualstudio.com");
        let url = urls.report_url(
            &scope(None),
            &BuildUri::new("vstfs:///Build/Build/88"),
            true,
        );
        assert_eq!(
            url,
            "https://example.visualstudio.com/DefaultCollection/web/_build#_a=summary&buildId=88"
        );
    }

    #[test]
    fn log_view_is_used_when_summary_is_not_wanted() {
        let urls = DashboardUrls::hosted("https://example.visualstudio.com");
        let url = urls.report_url(
            &scope(None),
            &BuildUri::new("vstfs:///Build/Build/88"),
            false,
        );
        assert!(url.ends_with("/web/_build#_a=log&buildUri=88"));
    }

    #[test]
    fn onprem_uses_scope_collection() {
        let urls = DashboardUrls::onprem("https://tfs.example.test/tfs");
        let url = urls.report_url(
            &scope(Some("Fabrikam")),
            &BuildUri::new("vstfs:///Build/Build/12"),
            true,
        );
        assert_eq!(
            url,
            "https://tfs.example.test/tfs/Fabrikam/web/_build#_a=summary&buildId=12"
        );
    }

    #[test]
    fn empty_build_uri_falls_back_to_definition_list() {
        let urls = DashboardUrls::hosted("https://example.visualstudio.com");
        let url = urls.report_url(&scope(None), &BuildUri::new(""), true);
        assert_eq!(
            url,
            "https://example.visualstudio.com/DefaultCollection/web/_build"
        );
    }

    #[test]
    fn avatar_prefers_the_payload_image_url() {
        let urls = DashboardUrls::hosted("https://example.visualstudio.com");
        let requester = Requester {
            display_name: "Ada".into(),
            image_url: Some("https://example.visualstudio.com/_api/Avatar?id=9".into()),
        };
        assert_eq!(
            urls.avatar_url(&scope(None), &requester),
            "https://example.visualstudio.com/_api/Avatar?id=9&size=2"
        );
    }

    #[test]
    fn avatar_without_image_url_hits_identity_image_endpoint() {
        let urls = DashboardUrls::onprem("https://tfs.example.test/tfs");
        let requester = Requester {
            display_name: "Ada Lovelace".into(),
            image_url: None,
        };
        let url = urls.avatar_url(&scope(Some("Fabrikam")), &requester);
        assert_eq!(
            url,
            "https://tfs.example.test/tfs/Fabrikam/_api/_common/IdentityImage?id=&identifier=Ada+Lovelace"
        );
    }
}
