use rocket::{
    http::Status,
    mtls::Certificate,
    request::{FromRequest, Outcome},
    Request,
};
use rworker_lib::{AuthenticationError, Identity};

/// The authenticated caller of a request.
///
/// The TLS layer already verified the client certificate against the trust
/// pool; whatever identity its common name carries is accepted as is.
pub struct Caller {
    pub identity: Identity,
}

impl Caller {
    pub fn new(identity: Identity) -> Self {
        Self { identity }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Caller {
    type Error = AuthenticationError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let client_cert = match request.guard::<Certificate<'r>>().await {
            Outcome::Success(client_cert) => client_cert,
            Outcome::Error((_, err)) => {
                return Outcome::Error((
                    Status::InternalServerError,
                    AuthenticationError::InvalidCertificate(err.to_string()),
                ))
            }
            Outcome::Forward(_) => {
                return Outcome::Error((
                    Status::InternalServerError,
                    AuthenticationError::MissingCertificate,
                ))
            }
        };
        match Identity::from_common_name(client_cert.subject().common_name()) {
            Ok(identity) => Outcome::Success(Caller::new(identity)),
            Err(err) => Outcome::Error((Status::InternalServerError, err)),
        }
    }
}
