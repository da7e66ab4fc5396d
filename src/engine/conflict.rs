use std::collections::HashSet;

use ulid::Ulid;

use crate::collaborators::MediaDescriptor;
use crate::limits::*;
use crate::model::*;

use super::EngineError;

/// First reservation on `bay` that intersects `window`, ignoring `exclude`'s own reservation.
pub(crate) fn first_clash(bay: &BayState, window: &Span, exclude: Option<Ulid>) -> Option<Reservation> {
    bay.overlapping(window)
        .find(|r| Some(r.task_id) != exclude)
        .copied()
}

/// Earliest end among reservations on `bay` that intersect `window`.
pub(crate) fn earliest_clash_end(bay: &BayState, window: &Span, exclude: Option<Ulid>) -> Option<Ms> {
    bay.overlapping(window)
        .filter(|r| Some(r.task_id) != exclude)
        .map(|r| r.span.end)
        .min()
}

pub(crate) fn validate_technicians(technicians: &[TechnicianAssignment]) -> Result<(), EngineError> {
    if technicians.is_empty() {
        return Err(EngineError::InvalidInput("at least one technician is required".into()));
    }
    if technicians.len() > MAX_TECHNICIANS_PER_TASK {
        return Err(EngineError::LimitExceeded("too many technicians on task"));
    }
    let mut seen = HashSet::new();
    for t in technicians {
        if !seen.insert(t.technician_id) {
            return Err(EngineError::InvalidInput(format!(
                "technician {} is assigned twice",
                t.technician_id
            )));
        }
    }
    let leads = technicians
        .iter()
        .filter(|t| t.role == TechnicianRole::Lead)
        .count();
    if leads > 1 {
        return Err(EngineError::InvalidInput("a task has at most one lead technician".into()));
    }
    Ok(())
}

pub(crate) fn validate_duration(minutes: u32) -> Result<Ms, EngineError> {
    let duration = minutes as Ms * MINUTE_MS;
    if duration <= 0 {
        return Err(EngineError::InvalidInput("expected duration must be positive".into()));
    }
    if duration > MAX_TASK_DURATION_MS {
        return Err(EngineError::LimitExceeded("expected duration too long"));
    }
    Ok(duration)
}

pub(crate) fn validate_text(field: &'static str, text: &str, max: usize) -> Result<(), EngineError> {
    if text.len() > max {
        return Err(EngineError::InvalidInput(format!("{field} longer than {max} bytes")));
    }
    Ok(())
}

pub(crate) fn validate_media(media: &[MediaDescriptor]) -> Result<(), EngineError> {
    if media.len() > MAX_MEDIA_PER_ENTRY {
        return Err(EngineError::LimitExceeded("too many media attachments"));
    }
    for m in media {
        validate_text("media file name", &m.file_name, MAX_NAME_LEN)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tech(role: TechnicianRole) -> TechnicianAssignment {
        TechnicianAssignment {
            technician_id: Ulid::new(),
            role,
        }
    }

    #[test]
    fn technician_shape_rules() {
        assert!(validate_technicians(&[]).is_err());
        assert!(validate_technicians(&[tech(TechnicianRole::Lead), tech(TechnicianRole::Assistant)]).is_ok());
        assert!(validate_technicians(&[tech(TechnicianRole::Assistant)]).is_ok());
        assert!(validate_technicians(&[tech(TechnicianRole::Lead), tech(TechnicianRole::Lead)]).is_err());

        let dup = tech(TechnicianRole::Assistant);
        assert!(validate_technicians(&[dup, dup]).is_err());

        let crowd: Vec<_> = (0..=MAX_TECHNICIANS_PER_TASK)
            .map(|_| tech(TechnicianRole::Assistant))
            .collect();
        assert!(matches!(
            validate_technicians(&crowd),
            Err(EngineError::LimitExceeded(_))
        ));
    }

    #[test]
    fn duration_bounds() {
        assert!(validate_duration(0).is_err());
        assert_eq!(validate_duration(60).unwrap(), HOUR_MS);
        assert!(validate_duration(24 * 60 + 1).is_err());
    }

    #[test]
    fn clash_ignores_excluded_task() {
        let mut bay = BayState::new(Bay {
            id: Ulid::new(),
            name: "b".into(),
        });
        let own = Reservation {
            task_id: Ulid::new(),
            span: Span::new(0, 100),
        };
        let other = Reservation {
            task_id: Ulid::new(),
            span: Span::new(50, 80),
        };
        bay.reserve(own);
        bay.reserve(other);

        let window = Span::new(10, 60);
        assert_eq!(first_clash(&bay, &window, None), Some(own));
        assert_eq!(first_clash(&bay, &window, Some(own.task_id)), Some(other));
        assert_eq!(earliest_clash_end(&bay, &window, None), Some(80));
        assert_eq!(first_clash(&bay, &Span::new(100, 200), None), None);
    }
}
