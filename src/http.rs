//! HTTP features

/// Helpers for constructing HTTP clients with the crate defaults.
pub mod client {
    use crate::consts;

    pub use reqwest::Client;

    /// Returns a default HTTP client builder.
    ///
    /// Redirects are not followed and every request is bounded by [`consts::HTTP_TIMEOUT`].
    #[must_use]
    pub fn builder() -> reqwest::ClientBuilder {
        reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(consts::HTTP_TIMEOUT)
            .user_agent(consts::HTTP_USER_AGENT)
    }
}
