//! Safety Guards (§4.10): `findHardLimit`/`hasManyHardLimit` overflow
//! detection via a `LIMIT n+1` fetch, so a runaway query is caught without
//! first pulling every matching row over the wire.

use crate::error::{OrmError, OrmResult};

/// Computes the SQL `LIMIT` to send for one `find`/relation query, combining
/// the caller's own `limit` option with the base's hard limit, and later
/// checks the fetched row count against the hard limit.
///
/// When both are set, the SQL limit is `min(user_limit, hard_limit + 1)`:
/// a user limit below the hard limit can never overflow, so the hard-limit
/// sentinel row is only fetched when the user limit wouldn't already cap the
/// result below it.
#[derive(Debug, Clone, Copy)]
pub struct LimitPlan {
    sql_limit: Option<u64>,
    hard_limit: Option<u64>,
}

impl LimitPlan {
    pub fn new(user_limit: Option<u64>, hard_limit: Option<u64>) -> Self {
        let sql_limit = match (user_limit, hard_limit) {
            (Some(u), Some(h)) => Some(u.min(h + 1)),
            (Some(u), None) => Some(u),
            (None, Some(h)) => Some(h + 1),
            (None, None) => None,
        };
        Self { sql_limit, hard_limit }
    }

    /// `LIMIT` value to render into the SQL, if any.
    pub fn sql_limit(&self) -> Option<u64> {
        self.sql_limit
    }

    /// Check the fetched rows against the hard limit. Raises
    /// `LimitExceededError{limit, actualCount}` when the hard limit's `n+1`
    /// sentinel row came back; otherwise returns the rows unchanged (the
    /// `LIMIT` already bounded them to at most `limit`, so there is no
    /// sentinel row left to trim).
    pub fn finish<T>(&self, rows: Vec<T>) -> OrmResult<Vec<T>> {
        if let Some(hard) = self.hard_limit {
            let hard_is_binding = self.sql_limit == Some(hard + 1);
            if hard_is_binding && rows.len() as u64 > hard {
                return Err(OrmError::limit_exceeded(hard, rows.len() as u64));
            }
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_limits_fetches_unbounded() {
        let plan = LimitPlan::new(None, None);
        assert_eq!(plan.sql_limit(), None);
    }

    #[test]
    fn hard_limit_alone_fetches_n_plus_one() {
        let plan = LimitPlan::new(None, Some(2));
        assert_eq!(plan.sql_limit(), Some(3));
        let err = plan.finish(vec![1, 2, 3]).unwrap_err();
        assert!(matches!(err, OrmError::LimitExceeded { limit: 2, actual: 3 }));
    }

    #[test]
    fn hard_limit_not_exceeded_passes_through() {
        let plan = LimitPlan::new(None, Some(5));
        let rows = plan.finish(vec![1, 2, 3]).unwrap();
        assert_eq!(rows, vec![1, 2, 3]);
    }

    #[test]
    fn user_limit_below_hard_limit_cannot_overflow() {
        let plan = LimitPlan::new(Some(1), Some(5));
        assert_eq!(plan.sql_limit(), Some(1));
        let rows = plan.finish(vec![1]).unwrap();
        assert_eq!(rows, vec![1]);
    }

    #[test]
    fn user_limit_above_hard_limit_is_capped_and_checked() {
        let plan = LimitPlan::new(Some(100), Some(2));
        assert_eq!(plan.sql_limit(), Some(3));
        let err = plan.finish(vec![1, 2, 3]).unwrap_err();
        assert!(matches!(err, OrmError::LimitExceeded { limit: 2, actual: 3 }));
    }
}
