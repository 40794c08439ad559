use url::Url;

/// Decides whether a resource URL targets one of the application's own backends.
#[derive(Clone, Debug, Default)]
pub struct FirstPartyHostDetector {
    hosts: Vec<String>,
}

impl FirstPartyHostDetector {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let hosts = hosts
            .into_iter()
            .map(|host| host.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|host| !host.is_empty())
            .collect();
        Self { hosts }
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn is_first_party(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        let Some(host) = parsed.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        self.hosts.iter().any(|candidate| {
            host == *candidate
                || host
                    .strip_suffix(candidate.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }
}
