//! where the `Region` and `Account` variables come from
use crate::error::{Error, Result};

/// Current region and account the commands operate in
pub trait Environment {
    fn region(&self) -> Result<String>;
    fn account(&self) -> Result<String>;
}

/// [Environment] with values fixed at startup (from flags or environment variables)
#[derive(Debug, Clone, Default, derive_new::new)]
pub struct StaticEnvironment {
    region: Option<String>,
    account: Option<String>,
}

impl Environment for StaticEnvironment {
    fn region(&self) -> Result<String> {
        self.region
            .clone()
            .ok_or_else(|| Error::input("Region is not configured (use --region or AWS_REGION)"))
    }

    fn account(&self) -> Result<String> {
        self.account.clone().ok_or_else(|| {
            Error::input("Account is not configured (use --account or SSM_CTL_ACCOUNT)")
        })
    }
}
