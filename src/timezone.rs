//! Per-session display timezone.
//!
//! The session stores the raw timezone name chosen on the set-timezone page.
//! [`timezone_middleware`] turns it into an [`ActiveTimezone`] for every
//! request, falling back to the configured default when the session has no
//! choice or holds a name that does not parse. Timestamps are stored in UTC
//! and converted at the edges with [`ActiveTimezone::localize`] and
//! [`ActiveTimezone::to_utc`].

use std::convert::Infallible;

use axum::async_trait;
use axum::body::Body;
use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use chrono::{LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::{Tz, TZ_VARIANTS};

use crate::db::TIMESTAMP_FORMAT;
use crate::error::{AppError, AppResult};
use crate::session::Session;
use crate::state::AppState;

/// Sorted names of every zone the middleware recognizes, aliases such as
/// `US/Eastern` or `Asia/Calcutta` included.
pub fn common_timezones() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = TZ_VARIANTS.iter().map(|tz| tz.name()).collect();
    names.sort_unstable();
    names.dedup();
    names
}

/// Resolve a session value to a zone, or `None` if it does not name one.
pub fn parse_timezone(name: &str) -> Option<Tz> {
    name.trim().parse::<Tz>().ok()
}

/// The zone in effect for the current request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveTimezone(pub Tz);

impl ActiveTimezone {
    pub fn name(&self) -> &'static str {
        self.0.name()
    }

    /// Render a stored UTC timestamp in this zone, e.g. `2024-03-10 09:30 CDT`.
    /// Values that are not stored timestamps are returned unchanged.
    pub fn localize(&self, utc: &str) -> String {
        match NaiveDateTime::parse_from_str(utc, TIMESTAMP_FORMAT) {
            Ok(naive) => Utc
                .from_utc_datetime(&naive)
                .with_timezone(&self.0)
                .format("%Y-%m-%d %H:%M %Z")
                .to_string(),
            Err(_) => utc.to_string(),
        }
    }

    /// Value for an `<input type="datetime-local">` showing a stored UTC
    /// timestamp in this zone.
    pub fn to_local_input(&self, utc: &str) -> Option<String> {
        NaiveDateTime::parse_from_str(utc, TIMESTAMP_FORMAT)
            .ok()
            .map(|naive| {
                Utc.from_utc_datetime(&naive)
                    .with_timezone(&self.0)
                    .format("%Y-%m-%dT%H:%M")
                    .to_string()
            })
    }

    /// Interpret user input as wall-clock time in this zone and convert it to
    /// the stored UTC format. Accepts `YYYY-MM-DDTHH:MM`, `YYYY-MM-DD HH:MM`
    /// and `YYYY-MM-DD` (midnight).
    pub fn to_utc(&self, local: &str) -> AppResult<String> {
        let local = local.trim();
        let naive = NaiveDateTime::parse_from_str(local, "%Y-%m-%dT%H:%M")
            .or_else(|_| NaiveDateTime::parse_from_str(local, "%Y-%m-%d %H:%M"))
            .or_else(|_| NaiveDateTime::parse_from_str(local, "%Y-%m-%dT%H:%M:%S"))
            .or_else(|_| {
                NaiveDate::parse_from_str(local, "%Y-%m-%d")
                    .map(|d| d.and_hms_opt(0, 0, 0).unwrap_or_default())
            })
            .map_err(|_| AppError::Validation(format!("Invalid date '{}'", local)))?;

        let instant = match self.0.from_local_datetime(&naive) {
            LocalResult::Single(dt) => dt,
            // Repeated wall-clock hour when clocks go back: take the first.
            LocalResult::Ambiguous(earliest, _) => earliest,
            LocalResult::None => {
                return Err(AppError::Validation(format!(
                    "{} does not exist in {}",
                    local,
                    self.name()
                )))
            }
        };

        Ok(instant
            .with_timezone(&Utc)
            .format(TIMESTAMP_FORMAT)
            .to_string())
    }
}

#[async_trait]
impl FromRequestParts<AppState> for ActiveTimezone {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<ActiveTimezone>()
            .copied()
            .unwrap_or(ActiveTimezone(state.config.time_zone)))
    }
}

/// Activate the session's timezone for the rest of the request.
pub async fn timezone_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let default = state.config.time_zone;

    let tz = match request.extensions().get::<Session>().and_then(|s| s.timezone()) {
        Some(name) => parse_timezone(&name).unwrap_or_else(|| {
            tracing::warn!(timezone = %name, "Ignoring unknown session timezone");
            default
        }),
        None => default,
    };

    request.extensions_mut().insert(ActiveTimezone(tz));
    next.run(request).await
}
