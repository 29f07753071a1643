use super::handlers::health;
use utoipa::openapi::{Contact, InfoBuilder, License, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Routes that are both served and documented. The gated proxy fallback is
/// not part of the document: its surface is whatever the dashboard serves.
pub(crate) fn api_router() -> OpenApiRouter {
    let mut router =
        OpenApiRouter::with_openapi(cargo_openapi()).routes(routes!(health::health));

    let mut health_tag = Tag::new("health");
    health_tag.description = Some("Liveness of the gate and its role store".to_string());
    router.get_openapi_mut().tags = Some(vec![health_tag]);

    router
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(Some(env!("CARGO_PKG_DESCRIPTION")).filter(|d| !d.trim().is_empty()))
        .build();

    info.contact = cargo_contact(env!("CARGO_PKG_AUTHORS"));
    let mut license = License::new(env!("CARGO_PKG_LICENSE"));
    license.identifier = Some(env!("CARGO_PKG_LICENSE").to_string());
    info.license = Some(license);

    OpenApiBuilder::new().info(info).build()
}

/// First Cargo author, `Name <email>`, as an `OpenAPI` contact.
fn cargo_contact(authors: &str) -> Option<Contact> {
    let primary = authors.split(';').next().map(str::trim)?;
    let (name, email) = match primary.split_once('<') {
        Some((name, email)) => (name.trim(), email.trim_end_matches('>').trim()),
        None => (primary, ""),
    };
    if name.is_empty() && email.is_empty() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = Some(name.to_string()).filter(|n| !n.is_empty());
    contact.email = Some(email.to_string()).filter(|e| !e.is_empty());
    Some(contact)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_info_from_cargo() {
        let spec = openapi();
        assert_eq!(spec.info.title, env!("CARGO_PKG_NAME"));
        assert_eq!(spec.info.version, env!("CARGO_PKG_VERSION"));

        let contact = spec.info.contact;
        assert!(contact.is_some());
        if let Some(contact) = contact {
            assert_eq!(contact.name.as_deref(), Some("Team Riglify"));
            assert_eq!(contact.email.as_deref(), Some("team@riglify.com"));
        }

        assert_eq!(
            spec.info.license.map(|l| l.name),
            Some("BSD-3-Clause".to_string())
        );
    }

    #[test]
    fn openapi_documents_health_only() {
        let spec = openapi();
        assert!(spec.paths.paths.contains_key("/health"));
        assert_eq!(spec.paths.paths.len(), 1);
    }

    #[test]
    fn contact_without_email() {
        let contact = cargo_contact("Ops Team");
        assert_eq!(
            contact.and_then(|c| c.name),
            Some("Ops Team".to_string())
        );
        assert!(cargo_contact("").is_none());
    }
}
