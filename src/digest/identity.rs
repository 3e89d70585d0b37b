use crate::digest::platform::ChatPlatform;
use crate::digest::types::UserProfile;
use crate::digest::warn;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Resolves opaque user ids to display names.
///
/// Successful lookups are cached for the life of the resolver; failures are
/// not, so a later cycle can retry a user the platform could not resolve.
pub struct IdentifierResolver {
    platform: Arc<dyn ChatPlatform>,
    cache: Mutex<HashMap<String, String>>,
}

pub fn display_name(profile: &UserProfile) -> String {
    [profile.display_name.as_deref(), profile.real_name.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|name| !name.is_empty())
        .unwrap_or(profile.handle.trim())
        .to_string()
}

impl IdentifierResolver {
    pub fn new(platform: Arc<dyn ChatPlatform>) -> Self {
        Self {
            platform,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn cached(&self, user_id: &str) -> Option<String> {
        self.cache
            .lock()
            .ok()
            .and_then(|cache| cache.get(user_id).cloned())
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().map(|cache| cache.len()).unwrap_or(0)
    }

    pub fn resolve(&self, user_id: &str) -> Option<String> {
        if user_id.trim().is_empty() {
            return None;
        }
        if let Some(name) = self.cached(user_id) {
            return Some(name);
        }

        // The lock is not held across the lookup; two threads racing on the
        // same miss both fetch and the second insert is a no-op overwrite.
        let profile = match self.platform.fetch_user_profile(user_id) {
            Ok(profile) => profile,
            Err(err) => {
                warn::emit("W_USER_LOOKUP", "resolve", "", user_id, &err.to_string());
                return None;
            }
        };
        let name = display_name(&profile);
        if name.is_empty() {
            return None;
        }
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(user_id.to_string(), name.clone());
        }
        Some(name)
    }

    /// Name to show for a speaker, falling back to the raw id.
    pub fn speaker_name(&self, user_id: &str) -> String {
        self.resolve(user_id)
            .unwrap_or_else(|| user_id.to_string())
    }

    /// Rewrites every `<@ID>` mention to `@name`. Unresolved mentions stay verbatim.
    pub fn substitute_identifiers(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(start) = rest.find("<@") {
            out.push_str(&rest[..start]);
            let candidate = &rest[start..];
            match mention_id(candidate) {
                Some(id) => {
                    let token_len = id.len() + 3;
                    match self.resolve(id) {
                        Some(name) => {
                            out.push('@');
                            out.push_str(&name);
                        }
                        None => out.push_str(&candidate[..token_len]),
                    }
                    rest = &candidate[token_len..];
                }
                None => {
                    out.push_str("<@");
                    rest = &candidate[2..];
                }
            }
        }
        out.push_str(rest);
        out
    }
}

/// `<@U123>` -> `U123`; anything else (lowercase, `|label`, unterminated) is not a mention token.
fn mention_id(candidate: &str) -> Option<&str> {
    let body = candidate.strip_prefix("<@")?;
    let end = body.find('>')?;
    let id = &body[..end];
    if id.is_empty()
        || !id
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
    {
        return None;
    }
    Some(id)
}
