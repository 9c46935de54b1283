use super::{hash_password, message, write, ApiResult, NewAccount};
use crate::error::ApiError;
use crate::handlers::{ok_json, Call};
use carelink_core::auth::{RoleName, RoleSet};
use carelink_core::{CoreError, UserId, UserView};

pub fn list(call: &Call<'_>) -> ApiResult {
    let users: Vec<UserView> = call
        .state
        .store
        .list_users()?
        .iter()
        .map(UserView::from)
        .collect();
    ok_json(&users)
}

pub fn get(call: &Call<'_>, id: UserId) -> ApiResult {
    let user = call
        .state
        .store
        .user(id)?
        .ok_or(CoreError::NotFound { entity: "User", id: id.get() })?;
    ok_json(&UserView::from(&user))
}

/// `POST /users/create?roleType=DOCTOR`
pub async fn create(call: &Call<'_>) -> ApiResult {
    let role: RoleName = call
        .query_param("roleType")
        .ok_or_else(|| ApiError::bad_request("Missing roleType parameter"))?
        .parse()?;
    let account: NewAccount = call.json()?;

    let hash = hash_password(account.password).await?;
    let user = write(call, move |store| {
        store.create_user(&account.email, hash, RoleSet::of(&[role]))
    })
    .await?;
    ok_json(&UserView::from(&user))
}

pub async fn delete(call: &Call<'_>, id: UserId) -> ApiResult {
    write(call, move |store| store.delete_user(id)).await?;
    message("User deleted successfully")
}
