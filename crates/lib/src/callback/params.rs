//! Parameters carried by an authentication redirect.
//!
//! Providers put credentials in the fragment (implicit flow) or in the query
//! string. Both are read; the fragment wins when a key appears in both.

use std::fmt;

use url::{Url, form_urlencoded};

use super::errors::CallbackError;
use crate::constants::{
    PARAM_ACCESS_TOKEN, PARAM_ERROR, PARAM_ERROR_DESCRIPTION, PARAM_FLOW_TYPE,
    PARAM_REFRESH_TOKEN, SENSITIVE_PARAMS,
};

/// What kind of email or provider flow produced the redirect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowType {
    Signup,
    Recovery,
    MagicLink,
    Invite,
    EmailChange,
}

impl FlowType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "signup" => Some(FlowType::Signup),
            "recovery" => Some(FlowType::Recovery),
            "magiclink" => Some(FlowType::MagicLink),
            "invite" => Some(FlowType::Invite),
            "email_change" => Some(FlowType::EmailChange),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FlowType::Signup => "signup",
            FlowType::Recovery => "recovery",
            FlowType::MagicLink => "magiclink",
            FlowType::Invite => "invite",
            FlowType::EmailChange => "email_change",
        }
    }
}

impl fmt::Display for FlowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The redirect parameters the callback flow cares about.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RedirectParams {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub flow: Option<FlowType>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl fmt::Debug for RedirectParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |token: &Option<String>| token.as_ref().map(|_| "<redacted>");
        f.debug_struct("RedirectParams")
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("flow", &self.flow)
            .field("error", &self.error)
            .field("error_description", &self.error_description)
            .finish()
    }
}

impl RedirectParams {
    /// Read the parameters from a URL's query and fragment.
    pub fn from_url(url: &Url) -> Self {
        let mut params = RedirectParams::default();
        for (key, value) in url.query_pairs() {
            params.absorb(&key, &value);
        }
        if let Some(fragment) = url.fragment() {
            for (key, value) in form_urlencoded::parse(fragment.as_bytes()) {
                params.absorb(&key, &value);
            }
        }
        params
    }

    fn absorb(&mut self, key: &str, value: &str) {
        let value = value.trim();
        if value.is_empty() {
            return;
        }
        match key {
            PARAM_ACCESS_TOKEN => self.access_token = Some(value.to_string()),
            PARAM_REFRESH_TOKEN => self.refresh_token = Some(value.to_string()),
            PARAM_FLOW_TYPE => self.flow = FlowType::parse(value),
            PARAM_ERROR => self.error = Some(value.to_string()),
            PARAM_ERROR_DESCRIPTION => self.error_description = Some(value.to_string()),
            _ => {}
        }
    }

    /// The credential pair, if the redirect carries one.
    ///
    /// A provider error or half a pair is malformed; no pair at all is not.
    pub fn credentials(&self) -> Result<Option<(&str, &str)>, CallbackError> {
        if let Some(code) = &self.error {
            return Err(CallbackError::Provider {
                code: code.clone(),
                description: self.error_description.clone().unwrap_or_default(),
            });
        }
        match (&self.access_token, &self.refresh_token) {
            (Some(access), Some(refresh)) => Ok(Some((access, refresh))),
            (None, None) => Ok(None),
            (Some(_), None) => Err(CallbackError::malformed("refresh_token is missing")),
            (None, Some(_)) => Err(CallbackError::malformed("access_token is missing")),
        }
    }
}

/// Strip every sensitive parameter from the query and fragment of `url`.
pub fn sanitize(url: &Url) -> Url {
    let mut clean = url.clone();

    let kept_query: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !SENSITIVE_PARAMS.contains(&key.as_ref()))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    if kept_query.is_empty() {
        clean.set_query(None);
    } else {
        clean.query_pairs_mut().clear().extend_pairs(kept_query);
    }

    if let Some(fragment) = url.fragment() {
        let is_params = fragment.contains('=');
        if is_params {
            let kept: Vec<(String, String)> = form_urlencoded::parse(fragment.as_bytes())
                .filter(|(key, _)| !SENSITIVE_PARAMS.contains(&key.as_ref()))
                .map(|(key, value)| (key.into_owned(), value.into_owned()))
                .collect();
            if kept.is_empty() {
                clean.set_fragment(None);
            } else {
                let encoded = form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(kept)
                    .finish();
                clean.set_fragment(Some(&encoded));
            }
        }
    }
    clean
}
