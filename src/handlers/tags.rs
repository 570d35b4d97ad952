use axum::extract::State;
use axum::response::Json;

use crate::auth::AjaxUser;
use crate::db::queries::tags;
use crate::error::ApiResult;
use crate::handlers::todos::ObjectListResponse;
use crate::models::TagUsage;
use crate::state::AppState;

/// Tags on the user's todos, for the tag filter and autocompletion.
pub async fn index(
    State(state): State<AppState>,
    AjaxUser(user): AjaxUser,
) -> ApiResult<Json<ObjectListResponse<TagUsage>>> {
    let conn = state.db.get()?;
    let object_list = tags::list_tags_for_owner(&conn, user.id)?;
    Ok(Json(ObjectListResponse { object_list }))
}
