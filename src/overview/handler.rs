pub(super) mod api {
    use axum::{
        Json,
        extract::{Path, State},
    };

    use crate::manager;
    use crate::overview::model::Overview;
    use crate::user;

    pub async fn find_all(
        user_id: Path<user::Id>,
        conv_manager: State<manager::Service>,
    ) -> crate::Result<Json<Vec<Overview>>> {
        let overviews = conv_manager.find_overviews(&user_id).await?;
        Ok(Json(overviews))
    }
}
