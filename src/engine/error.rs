use ulid::Ulid;

/// Broad classes of failure. Transport layers map these, not individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidInput,
    StateConflict,
    ResourceUnavailable,
    AlreadyExists,
    Cancelled,
    Internal,
}

#[derive(Debug)]
pub enum EngineError {
    NotFound { entity: &'static str, id: Ulid },
    InvalidInput(String),
    UnknownServices(Vec<Ulid>),
    /// The operation isn't legal from the entity's current status.
    StateConflict {
        entity: &'static str,
        id: Ulid,
        status: String,
        action: &'static str,
    },
    VehicleBusy(Ulid),
    SlotUnavailable { start: i64, capacity: usize },
    BaysUnavailable { horizon_ms: i64 },
    AlreadyExists { entity: &'static str, id: Ulid },
    LimitExceeded(&'static str),
    Cancelled,
    Collaborator(String),
    WalError(String),
}

impl EngineError {
    pub(crate) fn conflict(
        entity: &'static str,
        id: Ulid,
        status: impl std::fmt::Debug,
        action: &'static str,
    ) -> Self {
        EngineError::StateConflict {
            entity,
            id,
            status: format!("{status:?}"),
            action,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::NotFound { .. } => ErrorKind::NotFound,
            EngineError::InvalidInput(_)
            | EngineError::UnknownServices(_)
            | EngineError::SlotUnavailable { .. }
            | EngineError::LimitExceeded(_) => ErrorKind::InvalidInput,
            EngineError::StateConflict { .. } | EngineError::VehicleBusy(_) => {
                ErrorKind::StateConflict
            }
            EngineError::BaysUnavailable { .. } => ErrorKind::ResourceUnavailable,
            EngineError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            EngineError::Cancelled => ErrorKind::Cancelled,
            EngineError::Collaborator(_) | EngineError::WalError(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::NotFound { .. } => "NOT_FOUND",
            EngineError::InvalidInput(_) | EngineError::UnknownServices(_) => "INVALID_INPUT",
            EngineError::StateConflict { .. } | EngineError::VehicleBusy(_) => "STATE_CONFLICT",
            EngineError::SlotUnavailable { .. } => "SLOT_UNAVAILABLE",
            EngineError::BaysUnavailable { .. } => "BAYS_UNAVAILABLE",
            EngineError::AlreadyExists { .. } => "ALREADY_EXISTS",
            EngineError::LimitExceeded(_) => "LIMIT_EXCEEDED",
            EngineError::Cancelled => "CANCELLED",
            EngineError::Collaborator(_) => "COLLABORATOR_ERROR",
            EngineError::WalError(_) => "STORAGE_ERROR",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            EngineError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            EngineError::UnknownServices(ids) => {
                write!(f, "unknown service ids: ")?;
                for (i, id) in ids.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{id}")?;
                }
                Ok(())
            }
            EngineError::StateConflict {
                entity,
                id,
                status,
                action,
            } => write!(f, "cannot {action} {entity} {id} in status {status}"),
            EngineError::VehicleBusy(id) => {
                write!(f, "vehicle {id} already has an active booking or order")
            }
            EngineError::SlotUnavailable { start, capacity } => write!(
                f,
                "slot starting at {start} is unavailable (limit {capacity} bookings)"
            ),
            EngineError::BaysUnavailable { horizon_ms } => write!(
                f,
                "no bay is free within {} minutes",
                horizon_ms / 60_000
            ),
            EngineError::AlreadyExists { entity, id } => write!(f, "{entity} already exists for {id}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Cancelled => write!(f, "operation cancelled"),
            EngineError::Collaborator(e) => write!(f, "collaborator error: {e}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<crate::collaborators::CollaboratorError> for EngineError {
    fn from(e: crate::collaborators::CollaboratorError) -> Self {
        EngineError::Collaborator(e.0)
    }
}
