/// Endpoints reachable without a bearer credential
pub const DEFAULT_PUBLIC_ENDPOINTS: &[&str] = &["/api/v1/ai/analyze", "/auth/login", "/auth/register"];

/// Ordered list of URL fragments that mark an endpoint as public.
///
/// A URL is public when it contains any of the fragments. Everything else is
/// protected.
#[derive(Debug, Clone)]
pub struct EndpointRules {
    public: Vec<String>,
}

impl Default for EndpointRules {
    fn default() -> Self {
        Self::new(DEFAULT_PUBLIC_ENDPOINTS.iter().copied())
    }
}

impl EndpointRules {
    pub fn new<I, S>(public: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            public: public.into_iter().map(Into::into).collect(),
        }
    }

    /// Append fragments after the existing ones, skipping empty and duplicate entries
    pub fn with_public<I, S>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for fragment in extra {
            let fragment = fragment.into();
            if !fragment.is_empty() && !self.public.contains(&fragment) {
                self.public.push(fragment);
            }
        }
        self
    }

    /// First public fragment matching the URL
    pub fn matching_rule(&self, url: &str) -> Option<&str> {
        self.public
            .iter()
            .find(|fragment| url.contains(fragment.as_str()))
            .map(String::as_str)
    }

    pub fn is_public(&self, url: &str) -> bool {
        self.matching_rule(url).is_some()
    }

    pub fn public_fragments(&self) -> &[String] {
        &self.public
    }
}
