use std::fmt;

use uuid::Uuid;

use crate::error::AuthenticationError;

/// Caller identity taken from a verified client certificate.
///
/// The certificate's subject common name must hold a UUID. Identities only
/// partition the job directory, they carry no other privilege.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(Uuid);

impl Identity {
    pub fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn from_common_name(common_name: Option<&str>) -> Result<Self, AuthenticationError> {
        let common_name = common_name.ok_or(AuthenticationError::MissingCommonName)?;
        Uuid::parse_str(common_name.trim())
            .map(Self)
            .map_err(|_| AuthenticationError::MalformedCommonName(common_name.to_string()))
    }

    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
