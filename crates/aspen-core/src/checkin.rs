//! MDM check-in message types.

use crate::{Enrollment, ParseError};

/// Check-in message kinds from devices and user channels.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "MessageType")]
pub enum CheckinMessage {
    /// Initial device identity announcement.
    Authenticate(Authenticate),
    /// Push token registration (enrollment becomes commandable).
    TokenUpdate(TokenUpdate),
    /// Device unenrollment.
    CheckOut(CheckOut),
    /// User authentication challenge.
    UserAuthenticate(UserAuthenticate),
    /// Store a bootstrap token.
    SetBootstrapToken(SetBootstrapToken),
    /// Retrieve the bootstrap token.
    GetBootstrapToken(GetBootstrapToken),
    /// Declarative Management sync.
    DeclarativeManagement(DeclarativeManagement),
    /// Token exchange for services.
    GetToken(GetToken),
}

impl CheckinMessage {
    /// The enrollment block common to every kind.
    pub fn enrollment(&self) -> &Enrollment {
        match self {
            Self::Authenticate(m) => &m.enrollment,
            Self::TokenUpdate(m) => &m.enrollment,
            Self::CheckOut(m) => &m.enrollment,
            Self::UserAuthenticate(m) => &m.enrollment,
            Self::SetBootstrapToken(m) => &m.enrollment,
            Self::GetBootstrapToken(m) => &m.enrollment,
            Self::DeclarativeManagement(m) => &m.enrollment,
            Self::GetToken(m) => &m.enrollment,
        }
    }

    fn set_raw(&mut self, raw: &[u8]) {
        let target = match self {
            Self::Authenticate(m) => &mut m.raw,
            Self::TokenUpdate(m) => &mut m.raw,
            Self::CheckOut(m) => &mut m.raw,
            Self::UserAuthenticate(m) => &mut m.raw,
            Self::SetBootstrapToken(m) => &mut m.raw,
            Self::GetBootstrapToken(m) => &mut m.raw,
            Self::DeclarativeManagement(m) => &mut m.raw,
            Self::GetToken(m) => &mut m.raw,
        };
        *target = raw.to_vec();
    }
}

/// Authenticate message.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Authenticate {
    #[serde(flatten)]
    pub enrollment: Enrollment,

    /// APNs topic from the identity certificate.
    pub topic: String,

    #[serde(default)]
    pub build_version: Option<String>,

    #[serde(default, rename = "OSVersion")]
    pub os_version: Option<String>,

    #[serde(default)]
    pub product_name: Option<String>,

    #[serde(default)]
    pub serial_number: Option<String>,

    #[serde(default)]
    pub device_name: Option<String>,

    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub model_name: Option<String>,

    /// Raw message for storage.
    #[serde(skip)]
    pub raw: Vec<u8>,
}

/// TokenUpdate message.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TokenUpdate {
    #[serde(flatten)]
    pub enrollment: Enrollment,

    /// APNs topic from the identity certificate.
    pub topic: String,

    /// Push token.
    #[serde(with = "plist_data")]
    pub token: Vec<u8>,

    /// Push magic string.
    pub push_magic: String,

    /// Unlock token (device channel only).
    #[serde(default, with = "plist_data_opt")]
    pub unlock_token: Option<Vec<u8>>,

    /// Awaiting configuration (automated enrollment).
    #[serde(default)]
    pub awaiting_configuration: bool,

    /// Raw message for storage.
    #[serde(skip)]
    pub raw: Vec<u8>,
}

/// CheckOut message.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CheckOut {
    #[serde(flatten)]
    pub enrollment: Enrollment,

    pub topic: String,

    /// Raw message for storage.
    #[serde(skip)]
    pub raw: Vec<u8>,
}

/// UserAuthenticate message.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserAuthenticate {
    #[serde(flatten)]
    pub enrollment: Enrollment,

    #[serde(default)]
    pub digest_response: Option<String>,

    /// Raw message for storage.
    #[serde(skip)]
    pub raw: Vec<u8>,
}

/// SetBootstrapToken message.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SetBootstrapToken {
    #[serde(flatten)]
    pub enrollment: Enrollment,

    #[serde(with = "plist_data")]
    pub bootstrap_token: Vec<u8>,

    /// Raw message for storage.
    #[serde(skip)]
    pub raw: Vec<u8>,
}

/// GetBootstrapToken message.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetBootstrapToken {
    #[serde(flatten)]
    pub enrollment: Enrollment,

    /// Raw message for storage.
    #[serde(skip)]
    pub raw: Vec<u8>,
}

/// Bootstrap token response payload.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BootstrapToken {
    #[serde(with = "plist_data")]
    pub bootstrap_token: Vec<u8>,
}

/// DeclarativeManagement message.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeclarativeManagement {
    #[serde(flatten)]
    pub enrollment: Enrollment,

    /// Declarative protocol endpoint being accessed.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Declarative payload.
    #[serde(default, with = "plist_data_opt")]
    pub data: Option<Vec<u8>>,

    /// Raw message for storage.
    #[serde(skip)]
    pub raw: Vec<u8>,
}

/// GetToken message.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetToken {
    #[serde(flatten)]
    pub enrollment: Enrollment,

    /// Which token service is being requested.
    pub token_service_type: String,

    /// Raw message for storage.
    #[serde(skip)]
    pub raw: Vec<u8>,
}

/// GetToken response payload.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetTokenResponse {
    #[serde(with = "plist_data")]
    pub token_data: Vec<u8>,
}

/// Serde helper routing byte fields through plist `Data`.
pub(crate) mod plist_data {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        plist::Data::from(bytes.to_vec()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(plist::Data::deserialize(deserializer)?.into())
    }
}

/// Serde helper for optional plist `Data` fields.
pub(crate) mod plist_data_opt {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        bytes
            .as_ref()
            .map(|b| plist::Data::from(b.clone()))
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<plist::Data>::deserialize(deserializer)?.map(Into::into))
    }
}

/// Parse a check-in message from plist bytes, retaining the raw body.
pub fn parse_checkin(data: &[u8]) -> Result<CheckinMessage, ParseError> {
    let mut msg: CheckinMessage =
        plist::from_bytes(data).map_err(|e| ParseError::new(data, e))?;
    msg.set_raw(data);
    Ok(msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    const AUTHENTICATE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>MessageType</key>
    <string>Authenticate</string>
    <key>UDID</key>
    <string>AAA</string>
    <key>Topic</key>
    <string>com.apple.mgmt.example</string>
    <key>SerialNumber</key>
    <string>SER1AL</string>
</dict>
</plist>"#;

    const TOKEN_UPDATE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>MessageType</key>
    <string>TokenUpdate</string>
    <key>UDID</key>
    <string>AAA</string>
    <key>Topic</key>
    <string>com.apple.mgmt.example</string>
    <key>Token</key>
    <data>dG9rZW4=</data>
    <key>PushMagic</key>
    <string>magic-1</string>
</dict>
</plist>"#;

    #[test]
    fn parse_authenticate() {
        let msg = parse_checkin(AUTHENTICATE_XML.as_bytes()).unwrap();
        let CheckinMessage::Authenticate(auth) = &msg else {
            panic!("expected Authenticate, got {msg:?}");
        };
        assert_eq!(auth.enrollment.udid.as_deref(), Some("AAA"));
        assert_eq!(auth.topic, "com.apple.mgmt.example");
        assert_eq!(auth.serial_number.as_deref(), Some("SER1AL"));
        assert_eq!(auth.raw, AUTHENTICATE_XML.as_bytes());
    }

    #[test]
    fn parse_token_update() {
        let msg = parse_checkin(TOKEN_UPDATE_XML.as_bytes()).unwrap();
        let CheckinMessage::TokenUpdate(tu) = &msg else {
            panic!("expected TokenUpdate, got {msg:?}");
        };
        assert_eq!(tu.token, b"token");
        assert_eq!(tu.push_magic, "magic-1");
        assert!(tu.unlock_token.is_none());
    }

    #[test]
    fn garbage_keeps_content_for_logging() {
        let err = parse_checkin(b"not a plist").unwrap_err();
        assert_eq!(err.content, b"not a plist");
    }
}
