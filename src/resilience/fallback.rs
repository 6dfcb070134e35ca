use crate::error::{AppError, Result};

/// What to hand back when a resilient call fails.
#[derive(Debug, Clone)]
pub enum Fallback<T> {
    /// Return the failure to the caller unchanged.
    Propagate,
    /// Substitute this value for any failure.
    DefaultValue(T),
}

impl<T> Fallback<T> {
    pub fn is_propagate(&self) -> bool {
        matches!(self, Fallback::Propagate)
    }

    /// Applies the fallback to a failed call.
    ///
    /// `NotFound` and cancellation are never replaced: the first is a domain
    /// answer, the second means nobody is waiting for the value.
    pub fn resolve(self, dependency: &str, error: AppError) -> Result<T> {
        match self {
            Fallback::Propagate => Err(error),
            Fallback::DefaultValue(_)
                if error.is_not_found() || matches!(error, AppError::Cancelled) =>
            {
                Err(error)
            }
            Fallback::DefaultValue(value) => {
                tracing::warn!(
                    dependency = %dependency,
                    error = %error,
                    "Upstream call failed, serving fallback value"
                );
                Ok(value)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_propagate_returns_error() {
        let result: Result<u32> =
            Fallback::Propagate.resolve("erp", AppError::UpstreamTimeout("erp".into()));
        assert!(matches!(result, Err(AppError::UpstreamTimeout(_))));
    }

    #[test]
    fn test_default_value_absorbs_failures() {
        let failures = vec![
            AppError::UpstreamTimeout("warehouse".into()),
            AppError::UpstreamUnavailable("warehouse".into()),
            AppError::Upstream {
                dependency: "warehouse".into(),
                status: 503,
            },
            AppError::Internal(anyhow::anyhow!("boom")),
        ];

        for error in failures {
            let value = Fallback::DefaultValue(7).resolve("warehouse", error).unwrap();
            assert_eq!(value, 7);
        }
    }

    #[test]
    fn test_default_value_keeps_not_found() {
        let result = Fallback::DefaultValue(0).resolve("warehouse", AppError::NotFound("x".into()));
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
