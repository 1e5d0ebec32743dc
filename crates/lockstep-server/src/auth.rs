use std::sync::Arc;

use tonic::service::Interceptor;
use tonic::{Request, Status};

/// Metadata key carrying the shared access key.
pub const AUTHORIZATION: &str = "authorization";
/// Scheme prefix of the authorization value.
pub const SCHEME: &str = "SharedAccessKey ";

/// Rejects requests that do not present one of the configured shared keys.
/// With no keys configured every request is let through.
#[derive(Debug, Clone)]
pub struct SharedKeyAuth {
    keys: Arc<[String]>,
}

impl SharedKeyAuth {
    pub fn new(keys: &[String]) -> Self {
        Self {
            keys: keys.iter().cloned().collect(),
        }
    }
}

impl Interceptor for SharedKeyAuth {
    fn call(&mut self, request: Request<()>) -> Result<Request<()>, Status> {
        if self.keys.is_empty() {
            return Ok(request);
        }

        let presented = request
            .metadata()
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix(SCHEME))
            .map(str::trim);

        match presented {
            Some(key) if self.keys.iter().any(|k| k == key) => Ok(request),
            Some(_) => Err(Status::unauthenticated("invalid shared access key")),
            None => Err(Status::unauthenticated("missing shared access key")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::Code;

    fn request_with(value: Option<&str>) -> Request<()> {
        let mut request = Request::new(());
        if let Some(value) = value {
            request
                .metadata_mut()
                .insert(AUTHORIZATION, value.parse().unwrap());
        }
        request
    }

    #[test]
    fn open_when_no_keys_configured() {
        let mut auth = SharedKeyAuth::new(&[]);
        assert!(auth.call(request_with(None)).is_ok());
    }

    #[test]
    fn accepts_any_configured_key() {
        let mut auth = SharedKeyAuth::new(&["old".to_string(), "new".to_string()]);
        assert!(auth.call(request_with(Some("SharedAccessKey old"))).is_ok());
        assert!(auth.call(request_with(Some("SharedAccessKey new"))).is_ok());
    }

    #[test]
    fn rejects_wrong_or_missing_key() {
        let mut auth = SharedKeyAuth::new(&["secret".to_string()]);

        let wrong = auth
            .call(request_with(Some("SharedAccessKey guess")))
            .unwrap_err();
        assert_eq!(wrong.code(), Code::Unauthenticated);

        let bare = auth.call(request_with(Some("secret"))).unwrap_err();
        assert_eq!(bare.code(), Code::Unauthenticated);

        let missing = auth.call(request_with(None)).unwrap_err();
        assert_eq!(missing.code(), Code::Unauthenticated);
        assert_eq!(missing.message(), "missing shared access key");
    }
}
