pub(super) mod api {
    use axum::{
        Json,
        extract::{Path, State},
        http::StatusCode,
    };
    use serde::{Deserialize, Serialize};

    use crate::conversation::{self, model::Conversation};
    use crate::manager;
    use crate::message::{self, model::Message};
    use crate::user;

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct CreateParams {
        creator_id: user::Id,
        other_user_id: user::Id,
        name: String,
    }

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Created {
        conv_id: conversation::Id,
    }

    pub async fn create(
        conv_manager: State<manager::Service>,
        Json(params): Json<CreateParams>,
    ) -> crate::Result<(StatusCode, Json<Created>)> {
        let conv_id = conv_manager
            .create_conversation_with_overviews(
                &params.creator_id,
                &params.other_user_id,
                &params.name,
            )
            .await?;

        Ok((StatusCode::CREATED, Json(Created { conv_id })))
    }

    pub async fn find_one(
        id: Path<conversation::Id>,
        conv_manager: State<manager::Service>,
    ) -> crate::Result<Json<Conversation>> {
        let conv = conv_manager.find_conversation(&id).await?;

        conv.map(Json)
            .ok_or_else(|| conversation::Error::NotFound(id.0).into())
    }

    pub async fn delete(
        id: Path<conversation::Id>,
        conv_manager: State<manager::Service>,
    ) -> crate::Result<()> {
        conv_manager.delete_conversation_with_overviews(&id).await?;
        Ok(())
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct LeaveParams {
        deleter_id: user::Id,
        other_id: user::Id,
    }

    pub async fn leave(
        id: Path<conversation::Id>,
        conv_manager: State<manager::Service>,
        Json(params): Json<LeaveParams>,
    ) -> crate::Result<()> {
        conv_manager
            .leave_conversation(&id, &params.deleter_id, &params.other_id)
            .await?;
        Ok(())
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct SendParams {
        msg_id: Option<message::Id>,
        content: String,
        sender_id: user::Id,
        receiver_id: user::Id,
    }

    pub async fn send(
        id: Path<conversation::Id>,
        conv_manager: State<manager::Service>,
        Json(params): Json<SendParams>,
    ) -> crate::Result<(StatusCode, Json<Message>)> {
        let msg_id = params
            .msg_id
            .unwrap_or_else(|| conv_manager.new_message_id());
        let msg = Message::new(
            msg_id,
            &params.sender_id,
            &params.receiver_id,
            &params.content,
        );

        conv_manager.send_message(&id, &msg).await?;

        Ok((StatusCode::CREATED, Json(msg)))
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ReadParams {
        user_id: user::Id,
    }

    pub async fn mark_read(
        id: Path<conversation::Id>,
        conv_manager: State<manager::Service>,
        Json(params): Json<ReadParams>,
    ) -> crate::Result<()> {
        conv_manager.reset_unread_count(&id, &params.user_id).await?;
        Ok(())
    }
}
