//! Request parameters → [`JobArtifactQuery`]
//!
//! Shared by the HTTP handler and the CLI. Values arrive as strings so a
//! malformed number is reported against its parameter name.

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::artifacts::JobArtifactQuery;
use crate::constants::MAX_FILE_MATCHES;
use crate::line_matcher::LineMatcher;

/// A rejected request parameter
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParamError {
    #[error("required parameter is missing")]
    Missing { param: &'static str },

    #[error("{message}")]
    Invalid { param: &'static str, message: String },
}

impl ParamError {
    fn invalid(param: &'static str, message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(param, message = %message, "invalid request parameter");
        Self::Invalid { param, message }
    }

    /// Name of the offending parameter
    pub fn param(&self) -> &'static str {
        match self {
            Self::Missing { param } | Self::Invalid { param, .. } => param,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Missing { .. } => "ParameterMissing",
            Self::Invalid { .. } => "ParameterInvalid",
        }
    }
}

/// Raw query parameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryParams {
    /// Comma-separated job run ids
    pub prow_job_runs: Option<String>,
    pub path_glob: Option<String>,
    pub text_contains: Option<String>,
    pub text_regex: Option<String>,
    pub before_context: Option<String>,
    pub after_context: Option<String>,
    pub max_file_matches: Option<String>,
}

impl QueryParams {
    /// Validate and build the query
    ///
    /// `textContains` takes precedence over `textRegex`; with neither, the
    /// query lists artifacts without reading them.
    pub fn to_query(&self) -> Result<JobArtifactQuery, ParamError> {
        let matcher = self.content_matcher()?;

        let ids = non_empty(&self.prow_job_runs).ok_or(ParamError::Missing { param: "prowJobRuns" })?;
        let job_run_ids = parse_job_run_ids(ids)?;

        let path_glob = non_empty(&self.path_glob).ok_or(ParamError::Missing { param: "pathGlob" })?;

        let mut query = JobArtifactQuery::new(job_run_ids).with_path_glob(path_glob);
        query.content_matcher = matcher;
        Ok(query)
    }

    fn content_matcher(&self) -> Result<Option<LineMatcher>, ParamError> {
        if let Some(contains) = non_empty(&self.text_contains) {
            let (before, after, max) = self.matcher_limits()?;
            return Ok(Some(LineMatcher::substring(contains, before, after, max)));
        }
        if let Some(pattern) = non_empty(&self.text_regex) {
            let regex = Regex::new(pattern)
                .map_err(|e| ParamError::invalid("textRegex", format!("error parsing regex: {}", e)))?;
            let (before, after, max) = self.matcher_limits()?;
            return Ok(Some(LineMatcher::regex(regex, before, after, max)));
        }
        Ok(None)
    }

    fn matcher_limits(&self) -> Result<(usize, usize, usize), ParamError> {
        let before = read_limit("beforeContext", &self.before_context)?;
        let after = read_limit("afterContext", &self.after_context)?;
        let max = match read_limit("maxFileMatches", &self.max_file_matches)? {
            0 => MAX_FILE_MATCHES,
            n => n,
        };
        Ok((before, after, max))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Parse a comma-separated id list; blank entries are an error
pub fn parse_job_run_ids(raw: &str) -> Result<Vec<i64>, ParamError> {
    raw.split(',')
        .map(|part| {
            part.trim().parse::<i64>().map_err(|e| {
                ParamError::invalid("prowJobRuns", format!("unable to parse prowJobRuns id {:?}: {}", part, e))
            })
        })
        .collect()
}

/// Unsigned value no larger than the capture cap; absent means 0
fn read_limit(param: &'static str, value: &Option<String>) -> Result<usize, ParamError> {
    let Some(raw) = non_empty(value) else {
        return Ok(0);
    };
    if !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParamError::invalid(param, format!("invalid value for {:?} param: {:?}", param, raw)));
    }
    let parsed: usize = raw
        .parse()
        .map_err(|_| ParamError::invalid(param, format!("invalid value for {:?} param: {:?}", param, raw)))?;
    if parsed > MAX_FILE_MATCHES {
        return Err(ParamError::invalid(
            param,
            format!("value {} for {:?} param exceeds limit {}", parsed, param, MAX_FILE_MATCHES),
        ));
    }
    Ok(parsed)
}
