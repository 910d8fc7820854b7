//! Response language for a request: `?lang=` wins over `Accept-Language`,
//! English otherwise.

use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts};
use genstudio_core::{Locale, Message};
use std::convert::Infallible;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestLocale(pub Locale);

impl RequestLocale {
    pub fn text(&self, message: Message) -> String {
        message.text(self.0).to_string()
    }

    fn from_parts(parts: &Parts) -> Locale {
        let from_query = parts.uri.query().and_then(|query| {
            query
                .split('&')
                .filter_map(|pair| pair.split_once('='))
                .find(|(key, _)| *key == "lang")
                .and_then(|(_, value)| value.parse::<Locale>().ok())
        });

        from_query
            .or_else(|| {
                parts
                    .headers
                    .get(header::ACCEPT_LANGUAGE)
                    .and_then(|h| h.to_str().ok())
                    .and_then(Locale::from_accept_language)
            })
            .unwrap_or_default()
    }
}

impl<S> FromRequestParts<S> for RequestLocale
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(RequestLocale(Self::from_parts(parts)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(uri: &str, accept: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri(uri);
        if let Some(value) = accept {
            builder = builder.header(header::ACCEPT_LANGUAGE, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_query_overrides_header() {
        let p = parts("/api/v1/payments?lang=ar", Some("en-US"));
        assert_eq!(RequestLocale::from_parts(&p), Locale::Ar);
    }

    #[test]
    fn test_header_used_without_query() {
        let p = parts("/api/v1/payments", Some("ar-SA,en;q=0.5"));
        assert_eq!(RequestLocale::from_parts(&p), Locale::Ar);
    }

    #[test]
    fn test_defaults_to_english() {
        let p = parts("/api/v1/payments?lang=xx", Some("de-DE"));
        assert_eq!(RequestLocale::from_parts(&p), Locale::En);
    }
}
