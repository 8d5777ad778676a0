//! Format adapter configuration.

/// What to do when saving a 4D volume to a format that only holds 3D geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FourDPolicy {
    /// Keep the first three axes of spacing, origin and direction and drop the fourth.
    #[default]
    Truncate,
    /// Refuse with [`VolumeError::UnsupportedDimensionality`](crate::VolumeError::UnsupportedDimensionality).
    Reject,
}

/// Format adapter configuration.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Policy for saving 4D volumes.
    pub four_d_policy: FourDPolicy,
    /// Require the smallest axis of a 4D array to be axis 0 before
    /// synthesising a fourth geometric axis on load.
    pub require_channel_first: bool,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            four_d_policy: FourDPolicy::Truncate,
            require_channel_first: true,
        }
    }
}

impl AdapterConfig {
    /// Create a new adapter config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the 4D save policy.
    pub fn with_four_d_policy(mut self, policy: FourDPolicy) -> Self {
        self.four_d_policy = policy;
        self
    }

    /// Reject 4D saves instead of truncating geometry.
    pub fn rejecting_four_d(self) -> Self {
        self.with_four_d_policy(FourDPolicy::Reject)
    }

    /// Accept 4D arrays on load whatever their axis sizes.
    pub fn without_channel_first_check(mut self) -> Self {
        self.require_channel_first = false;
        self
    }
}
