//! Callback payloads carried by inline buttons, in `<verb>:<value>` form.
//!
//! The same type renders and parses payloads, so keyboards and routing agree
//! on the wire format.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Views reachable through a `back:` button
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackTarget {
    Regions,
}

impl BackTarget {
    fn keyword(self) -> &'static str {
        match self {
            BackTarget::Regions => "region",
        }
    }
}

/// A parsed button payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    /// Open a region's district list
    Region(i64),
    /// Show a district's details
    District(i64),
    /// Ask for a district's new name
    ChangeDistrict(i64),
    RemoveDistrict(i64),
    Back(BackTarget),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("payload '{0}' has no ':' separator")]
    MissingSeparator(String),
    #[error("unknown verb '{0}'")]
    UnknownVerb(String),
    #[error("'{value}' is not a valid id for '{verb}'")]
    InvalidId { verb: String, value: String },
    #[error("unknown back target '{0}'")]
    UnknownTarget(String),
}

impl CallbackAction {
    fn verb(&self) -> &'static str {
        match self {
            CallbackAction::Region(_) => "region",
            CallbackAction::District(_) => "district",
            CallbackAction::ChangeDistrict(_) => "change_district",
            CallbackAction::RemoveDistrict(_) => "remove_district",
            CallbackAction::Back(_) => "back",
        }
    }
}

impl fmt::Display for CallbackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallbackAction::Region(id)
            | CallbackAction::District(id)
            | CallbackAction::ChangeDistrict(id)
            | CallbackAction::RemoveDistrict(id) => write!(f, "{}:{}", self.verb(), id),
            CallbackAction::Back(target) => write!(f, "{}:{}", self.verb(), target.keyword()),
        }
    }
}

impl FromStr for CallbackAction {
    type Err = PayloadError;

    fn from_str(payload: &str) -> Result<Self, Self::Err> {
        let (verb, value) = payload
            .split_once(':')
            .ok_or_else(|| PayloadError::MissingSeparator(payload.to_string()))?;

        let id = || {
            value.parse::<i64>().map_err(|_| PayloadError::InvalidId {
                verb: verb.to_string(),
                value: value.to_string(),
            })
        };

        match verb {
            "region" => Ok(CallbackAction::Region(id()?)),
            "district" => Ok(CallbackAction::District(id()?)),
            "change_district" => Ok(CallbackAction::ChangeDistrict(id()?)),
            "remove_district" => Ok(CallbackAction::RemoveDistrict(id()?)),
            "back" => match value {
                "region" => Ok(CallbackAction::Back(BackTarget::Regions)),
                other => Err(PayloadError::UnknownTarget(other.to_string())),
            },
            other => Err(PayloadError::UnknownVerb(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_payloads() {
        assert_eq!("region:3".parse::<CallbackAction>(), Ok(CallbackAction::Region(3)));
        assert_eq!("district:12".parse::<CallbackAction>(), Ok(CallbackAction::District(12)));
        assert_eq!(
            "change_district:7".parse::<CallbackAction>(),
            Ok(CallbackAction::ChangeDistrict(7))
        );
        assert_eq!(
            "remove_district:7".parse::<CallbackAction>(),
            Ok(CallbackAction::RemoveDistrict(7))
        );
        assert_eq!(
            "back:region".parse::<CallbackAction>(),
            Ok(CallbackAction::Back(BackTarget::Regions))
        );
    }

    #[test]
    fn test_render_matches_wire_format() {
        assert_eq!(CallbackAction::Region(3).to_string(), "region:3");
        assert_eq!(
            CallbackAction::ChangeDistrict(7).to_string(),
            "change_district:7"
        );
        assert_eq!(
            CallbackAction::RemoveDistrict(7).to_string(),
            "remove_district:7"
        );
        assert_eq!(
            CallbackAction::Back(BackTarget::Regions).to_string(),
            "back:region"
        );
    }

    #[test]
    fn test_rejects_malformed_payloads() {
        assert!(matches!(
            "region".parse::<CallbackAction>(),
            Err(PayloadError::MissingSeparator(_))
        ));
        assert!(matches!(
            "region:abc".parse::<CallbackAction>(),
            Err(PayloadError::InvalidId { .. })
        ));
        assert!(matches!(
            "edit_district:1".parse::<CallbackAction>(),
            Err(PayloadError::UnknownVerb(_))
        ));
        assert!(matches!(
            "back:district".parse::<CallbackAction>(),
            Err(PayloadError::UnknownTarget(_))
        ));
        assert!(matches!(
            "".parse::<CallbackAction>(),
            Err(PayloadError::MissingSeparator(_))
        ));
    }
}
