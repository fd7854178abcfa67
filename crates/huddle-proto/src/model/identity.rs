use serde::{Deserialize, Serialize};

/// Kind of authenticated actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityKind {
    Individual,
    Institutional,
}

impl IdentityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Individual => "individual",
            Self::Institutional => "institutional",
        }
    }
}

/// An authenticated actor, mirrored from the auth subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub display_name: String,
    pub kind: IdentityKind,
    /// Contact address for outbound notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Identity {
    pub fn is_institutional(&self) -> bool {
        self.kind == IdentityKind::Institutional
    }
}
