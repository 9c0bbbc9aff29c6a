//! Classification of failed attempts into a follow-up attempt or a fatal error.

use crate::dialect::Dialect;

use super::error::{DriverError, DriverErrorKind};

/// Attempts per request, the first included.
pub const MAX_ATTEMPTS: usize = 2;

/// How booleans are sent to the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BooleanMode {
    Native,
    /// As the dialect's boolean strings.
    String,
}

impl BooleanMode {
    pub fn toggled(self) -> Self {
        match self {
            BooleanMode::Native => BooleanMode::String,
            BooleanMode::String => BooleanMode::Native,
        }
    }
}

/// Settings for one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptPlan {
    pub boolean_mode: BooleanMode,
    /// Leave null arguments out of a procedure call.
    pub omit_null_arguments: bool,
}

impl AttemptPlan {
    /// The first attempt for a dialect.
    pub fn initial(dialect: &Dialect, omit_null_arguments: bool) -> Self {
        let boolean_mode = if dialect.supports(crate::dialect::Feature::NativeBoolean) {
            BooleanMode::Native
        } else {
            BooleanMode::String
        };
        Self {
            boolean_mode,
            omit_null_arguments,
        }
    }
}

/// Plan for the next attempt after `error`, or `None` when the failure is
/// fatal. Cancellation and timeouts are resolved by the caller first.
pub fn classify(
    plan: AttemptPlan,
    error: &DriverError,
    dialect: &Dialect,
    has_booleans: bool,
) -> Option<AttemptPlan> {
    if plan.omit_null_arguments {
        return Some(AttemptPlan {
            omit_null_arguments: false,
            ..plan
        });
    }

    if !has_booleans {
        return None;
    }

    let code = error.code().unwrap_or_default();
    let boolean_mode = match plan.boolean_mode {
        BooleanMode::Native if dialect.retry.is_string_boolean(code) => BooleanMode::String,
        BooleanMode::String if dialect.retry.is_native_boolean(code) => BooleanMode::Native,
        mode if error.kind == DriverErrorKind::Conversion => mode.toggled(),
        _ => return None,
    };
    Some(AttemptPlan {
        boolean_mode,
        ..plan
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Product;

    fn native() -> AttemptPlan {
        AttemptPlan {
            boolean_mode: BooleanMode::Native,
            omit_null_arguments: false,
        }
    }

    #[test]
    fn test_initial_plan_follows_dialect() {
        let pg = Dialect::for_product(Product::PostgreSql);
        let oracle = Dialect::for_product(Product::Oracle);
        assert_eq!(AttemptPlan::initial(&pg, false).boolean_mode, BooleanMode::Native);
        assert_eq!(AttemptPlan::initial(&oracle, true).boolean_mode, BooleanMode::String);
    }

    #[test]
    fn test_boolean_codes_toggle_mode() {
        let pg = Dialect::for_product(Product::PostgreSql);
        let err = DriverError::database("42883", "operator does not exist: boolean = text");
        let next = classify(native(), &err, &pg, true).unwrap();
        assert_eq!(next.boolean_mode, BooleanMode::String);

        let err = DriverError::database("42804", "column is of type boolean");
        let next = classify(next, &err, &pg, true).unwrap();
        assert_eq!(next.boolean_mode, BooleanMode::Native);
    }

    #[test]
    fn test_conversion_error_toggles_mode() {
        let pg = Dialect::for_product(Product::PostgreSql);
        let err = DriverError::new(DriverErrorKind::Conversion, "error serializing parameter 0");
        assert_eq!(
            classify(native(), &err, &pg, true).map(|p| p.boolean_mode),
            Some(BooleanMode::String)
        );
        assert_eq!(classify(native(), &err, &pg, false), None);
    }

    #[test]
    fn test_null_omission_retries_with_original_call() {
        let pg = Dialect::for_product(Product::PostgreSql);
        let err = DriverError::database("42883", "procedure proc(a => integer) does not exist");
        let plan = AttemptPlan {
            omit_null_arguments: true,
            ..native()
        };
        let next = classify(plan, &err, &pg, false).unwrap();
        assert!(!next.omit_null_arguments);
        assert_eq!(next.boolean_mode, BooleanMode::Native);
    }

    #[test]
    fn test_unrelated_errors_are_fatal() {
        let pg = Dialect::for_product(Product::PostgreSql);
        let err = DriverError::database("42P01", "relation does not exist");
        assert_eq!(classify(native(), &err, &pg, true), None);
    }
}
