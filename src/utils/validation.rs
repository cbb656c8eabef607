use crate::error::{EngineError, EngineResult};
use crate::models::PreferenceUpdate;

const MAX_PREFERENCES_PER_USER: usize = 100;

/// An empty list is valid and clears the user's preferences.
pub fn validate_preferences(updates: &[PreferenceUpdate]) -> EngineResult<()> {
    if updates.len() > MAX_PREFERENCES_PER_USER {
        return Err(EngineError::InvalidPreference(format!(
            "too many preference rows (max {})",
            MAX_PREFERENCES_PER_USER
        )));
    }

    for (idx, update) in updates.iter().enumerate() {
        validate_preference(update)
            .map_err(|reason| EngineError::InvalidPreference(format!("row {}: {}", idx, reason)))?;
    }
    Ok(())
}

fn validate_preference(update: &PreferenceUpdate) -> Result<(), String> {
    if !update.preference_score.is_finite() {
        return Err("preference score must be finite".to_string());
    }

    if update.preference_score <= 0.0 {
        return Err("preference score must be positive".to_string());
    }

    if update.favorite_item.is_none() && update.category_id.is_none() && update.dietary_restriction.is_none() {
        return Err("one of favorite_item, category_id or dietary_restriction is required".to_string());
    }

    let ids = [update.favorite_item, update.category_id, update.dietary_restriction];
    if ids.iter().flatten().any(|&id| id <= 0) {
        return Err("ids must be positive".to_string());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(favorite_item: Option<i64>, category_id: Option<i64>, score: f64) -> PreferenceUpdate {
        PreferenceUpdate {
            favorite_item,
            dietary_restriction: None,
            category_id,
            preference_score: score,
        }
    }

    #[test]
    fn test_valid_preferences() {
        assert!(validate_preferences(&[update(Some(3), None, 1.0), update(None, Some(2), 0.5)]).is_ok());
        assert!(validate_preferences(&[]).is_ok());
    }

    #[test]
    fn test_rejects_bad_scores() {
        assert!(validate_preferences(&[update(Some(3), None, 0.0)]).is_err());
        assert!(validate_preferences(&[update(Some(3), None, -2.0)]).is_err());
        assert!(validate_preferences(&[update(Some(3), None, f64::NAN)]).is_err());
    }

    #[test]
    fn test_rejects_rows_without_target() {
        let err = validate_preferences(&[update(Some(1), None, 1.0), update(None, None, 1.0)]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidPreference(ref msg) if msg.starts_with("row 1")));
    }

    #[test]
    fn test_rejects_non_positive_ids() {
        assert!(validate_preferences(&[update(Some(0), None, 1.0)]).is_err());
    }
}
