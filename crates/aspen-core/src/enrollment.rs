//! Enrollment identity and the check-in normalizer.

use crate::Error;

/// Type of MDM enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum EnrollType {
    /// Standard device channel (UDID-based).
    Device,
    /// User channel on a device.
    User,
    /// User Enrollment device channel (EnrollmentID-based).
    UserEnrollmentDevice,
    /// User channel on a User Enrollment device.
    UserEnrollment,
}

impl EnrollType {
    /// Whether this is a user channel on some device enrollment.
    pub fn is_user_channel(self) -> bool {
        matches!(self, Self::User | Self::UserEnrollment)
    }
}

/// Raw enrollment block from check-in and command-report messages.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Enrollment {
    /// Device UDID (legacy enrollments).
    #[serde(default, rename = "UDID")]
    pub udid: Option<String>,

    /// User ID for user-channel enrollments.
    #[serde(default, rename = "UserID")]
    pub user_id: Option<String>,

    /// User short name (Managed Apple ID).
    #[serde(default)]
    pub user_short_name: Option<String>,

    /// User long name.
    #[serde(default)]
    pub user_long_name: Option<String>,

    /// Enrollment ID for User Enrollment devices.
    #[serde(default, rename = "EnrollmentID")]
    pub enrollment_id: Option<String>,

    /// Enrollment User ID for User Enrollment user channels.
    #[serde(default, rename = "EnrollmentUserID")]
    pub enrollment_user_id: Option<String>,
}

/// Resolved, canonical enrollment identifier.
///
/// Device channels use the UDID or EnrollmentID directly. User
/// channels are `<device-id>:<user-id>` with `parent_id` referring
/// back to the device enrollment, which storage backends rely on for
/// cascades.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct EnrollId {
    /// The enrollment type.
    pub enroll_type: EnrollType,
    /// Canonical identifier.
    pub id: String,
    /// Parent device ID (user channels only).
    pub parent_id: Option<String>,
}

impl EnrollId {
    /// Re-check the identifier invariants.
    ///
    /// Storage backends call this to defend against hand-built ids.
    pub fn validate(&self) -> Result<(), Error> {
        if self.id.is_empty() {
            return Err(Error::InvalidEnrollment("empty enrollment id".into()));
        }
        match &self.parent_id {
            Some(parent) if parent.is_empty() => {
                Err(Error::InvalidEnrollment("empty parent id".into()))
            }
            Some(parent) if !self.id.starts_with(&format!("{parent}:")) => Err(
                Error::InvalidEnrollment("user channel id does not extend its parent".into()),
            ),
            None if self.id.contains(':') => Err(Error::InvalidEnrollment(
                "device channel id contains delimiter".into(),
            )),
            _ => Ok(()),
        }
    }
}

impl EnrollId {
    /// The device-channel identifier this enrollment hangs off.
    ///
    /// For a device channel this is the id itself; for a user channel
    /// the parent. Cert-auth keys on this, since both channels
    /// present the same identity certificate.
    pub fn device_channel(&self) -> EnrollId {
        match &self.parent_id {
            Some(parent) => EnrollId {
                enroll_type: match self.enroll_type {
                    EnrollType::UserEnrollment => EnrollType::UserEnrollmentDevice,
                    _ => EnrollType::Device,
                },
                id: parent.clone(),
                parent_id: None,
            },
            None => self.clone(),
        }
    }
}

impl std::fmt::Display for EnrollId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id)
    }
}

fn nonempty(s: &Option<String>) -> Option<&str> {
    s.as_deref().filter(|v| !v.is_empty())
}

impl Enrollment {
    fn device_channel_id(&self) -> Option<(&str, bool)> {
        // Prefer the UDID; fall back to the EnrollmentID for User
        // Enrollment devices.
        if let Some(udid) = nonempty(&self.udid) {
            return Some((udid, false));
        }
        nonempty(&self.enrollment_id).map(|id| (id, true))
    }

    fn user_channel_id(&self) -> Option<&str> {
        nonempty(&self.user_id)
            .or_else(|| nonempty(&self.enrollment_user_id))
            .or_else(|| nonempty(&self.user_short_name))
    }

    /// Whether the block denotes a user channel.
    fn is_user_channel(&self) -> bool {
        self.user_id.is_some()
            || self.enrollment_user_id.is_some()
            || self.user_short_name.is_some()
    }

    /// Normalize this enrollment block to its canonical [`EnrollId`].
    ///
    /// Pure and deterministic: equal inputs yield byte-equal ids,
    /// which is what makes deduplication and cert binding tractable.
    pub fn resolve(&self) -> Result<EnrollId, Error> {
        let Some((device_id, user_enrollment)) = self.device_channel_id() else {
            return Err(Error::InvalidEnrollment(
                "no UDID or EnrollmentID in enrollment".into(),
            ));
        };
        if device_id.contains(':') {
            return Err(Error::InvalidEnrollment(
                "device id contains delimiter".into(),
            ));
        }
        if !self.is_user_channel() {
            return Ok(EnrollId {
                enroll_type: if user_enrollment {
                    EnrollType::UserEnrollmentDevice
                } else {
                    EnrollType::Device
                },
                id: device_id.to_string(),
                parent_id: None,
            });
        }
        let Some(user_id) = self.user_channel_id() else {
            return Err(Error::InvalidEnrollment(
                "user channel without a user id".into(),
            ));
        };
        if user_id.contains(':') {
            return Err(Error::InvalidEnrollment(
                "user id contains delimiter".into(),
            ));
        }
        Ok(EnrollId {
            enroll_type: if user_enrollment {
                EnrollType::UserEnrollment
            } else {
                EnrollType::User
            },
            id: format!("{device_id}:{user_id}"),
            parent_id: Some(device_id.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_enrollment() {
        let enrollment = Enrollment {
            udid: Some("ABC123".into()),
            ..Default::default()
        };
        let id = enrollment.resolve().unwrap();
        assert_eq!(id.enroll_type, EnrollType::Device);
        assert_eq!(id.id, "ABC123");
        assert!(id.parent_id.is_none());
        id.validate().unwrap();
    }

    #[test]
    fn user_channel() {
        let enrollment = Enrollment {
            udid: Some("ABC123".into()),
            user_id: Some("user-456".into()),
            ..Default::default()
        };
        let id = enrollment.resolve().unwrap();
        assert_eq!(id.enroll_type, EnrollType::User);
        assert_eq!(id.id, "ABC123:user-456");
        assert_eq!(id.parent_id.as_deref(), Some("ABC123"));
        id.validate().unwrap();
    }

    #[test]
    fn user_enrollment_channels() {
        let device = Enrollment {
            enrollment_id: Some("UE-1".into()),
            ..Default::default()
        };
        assert_eq!(
            device.resolve().unwrap().enroll_type,
            EnrollType::UserEnrollmentDevice
        );

        let user = Enrollment {
            enrollment_id: Some("UE-1".into()),
            enrollment_user_id: Some("u".into()),
            ..Default::default()
        };
        let id = user.resolve().unwrap();
        assert_eq!(id.enroll_type, EnrollType::UserEnrollment);
        assert_eq!(id.id, "UE-1:u");
    }

    #[test]
    fn udid_preferred_over_enrollment_id() {
        let enrollment = Enrollment {
            udid: Some("UDID-1".into()),
            enrollment_id: Some("UE-1".into()),
            ..Default::default()
        };
        assert_eq!(enrollment.resolve().unwrap().id, "UDID-1");
    }

    #[test]
    fn short_name_fallback() {
        let enrollment = Enrollment {
            udid: Some("D".into()),
            user_short_name: Some("alice".into()),
            ..Default::default()
        };
        assert_eq!(enrollment.resolve().unwrap().id, "D:alice");
    }

    #[test]
    fn empty_block_rejected() {
        assert!(matches!(
            Enrollment::default().resolve(),
            Err(Error::InvalidEnrollment(_))
        ));
    }

    #[test]
    fn empty_device_id_rejected() {
        let enrollment = Enrollment {
            udid: Some(String::new()),
            ..Default::default()
        };
        assert!(enrollment.resolve().is_err());
    }

    #[test]
    fn user_channel_without_user_id_rejected() {
        let enrollment = Enrollment {
            udid: Some("D".into()),
            user_id: Some(String::new()),
            user_short_name: Some(String::new()),
            ..Default::default()
        };
        assert!(enrollment.resolve().is_err());
    }

    #[test]
    fn delimiter_in_ids_rejected() {
        let device = Enrollment {
            udid: Some("A:B".into()),
            ..Default::default()
        };
        assert!(device.resolve().is_err());

        let user = Enrollment {
            udid: Some("D".into()),
            user_id: Some("u:1".into()),
            ..Default::default()
        };
        assert!(user.resolve().is_err());
    }

    #[test]
    fn device_channel_key() {
        let user = Enrollment {
            udid: Some("AAA".into()),
            user_id: Some("BBB".into()),
            ..Default::default()
        };
        let id = user.resolve().unwrap();
        let device = id.device_channel();
        assert_eq!(device.id, "AAA");
        assert_eq!(device.enroll_type, EnrollType::Device);
        assert!(device.parent_id.is_none());
        assert_eq!(device.device_channel(), device);
    }

    #[test]
    fn resolution_is_deterministic() {
        let enrollment = Enrollment {
            udid: Some("AAA".into()),
            user_id: Some("BBB".into()),
            ..Default::default()
        };
        let a = enrollment.resolve().unwrap();
        let b = enrollment.clone().resolve().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.id.as_bytes(), b.id.as_bytes());
    }
}
