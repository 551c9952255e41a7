use facelink_core::Navigator;

/// Opens identity profiles in the desktop's default browser.
pub struct BrowserNavigator {
    profile_url: String,
}

impl BrowserNavigator {
    pub fn new(profile_url: impl Into<String>) -> Self {
        let profile_url = profile_url.into().trim_end_matches('/').to_string();
        Self { profile_url }
    }

    pub fn profile_url_for(&self, identity_id: &str) -> String {
        format!("{}/{}", self.profile_url, identity_id)
    }
}

impl Navigator for BrowserNavigator {
    fn open_profile(&self, identity_id: &str) {
        let url = self.profile_url_for(identity_id);
        // Detached so the engine never waits on the browser launcher.
        if let Err(e) = open::that_detached(&url) {
            tracing::warn!(url, error = %e, "failed to open profile");
        }
    }
}
