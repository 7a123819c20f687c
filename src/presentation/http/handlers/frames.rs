//! Client frame handler.
//!
//! The socket layer in front of this service forwards each client frame
//! here. Presence pings refresh the sender's presence record; presence
//! queries are answered on the sender's own channel.

use axum::{extract::State, http::StatusCode, Json};
use tracing::instrument;
use validator::Validate;

use crate::application::dto::InboundFrame;
use crate::presentation::middleware::AuthUser;
use crate::shared::error::AppError;
use crate::shared::validation::validation_error;
use crate::startup::AppState;

/// `POST /v1/frames`
#[instrument(skip(state, frame), fields(userid = %user.userid))]
pub async fn handle_frame(
    State(state): State<AppState>,
    user: AuthUser,
    Json(frame): Json<InboundFrame>,
) -> Result<StatusCode, AppError> {
    match frame {
        InboundFrame::Presence(ping) => {
            ping.validate().map_err(validation_error)?;
            state
                .presence
                .set_presence(&user.userid, &ping.location)
                .await?;
        }
        InboundFrame::PresenceQuery(query) => {
            query.validate().map_err(validation_error)?;
            state
                .fanout
                .presence_query(&user.userid, &query.userids)
                .await?;
        }
    }

    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /v1/presence`: the client disconnected.
pub async fn clear_presence(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<StatusCode, AppError> {
    state.presence.clear_presence(&user.userid).await?;
    Ok(StatusCode::NO_CONTENT)
}
