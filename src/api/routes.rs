use actix_web::{delete, get, post, web, HttpResponse};
use serde_json::json;

use crate::api::middleware::{AuthenticatedUser, MaybeUser};
use crate::api::models::{
    CardSummary, DrawCardsRequest, DrawCardsResponse, MessageRequest, NewSessionResponse,
    PaginationQuery, SaveLayoutRequest, SaveReadingRequest, SessionQuery, SubmitQuestionsRequest,
    SubsetQuery,
};
use crate::reading::{DrawRequest, ReadingError, ReadingService};

type ApiResult = Result<HttpResponse, ReadingError>;

// --- Reading flow ---

#[post("/new-session")]
pub async fn new_session(service: web::Data<ReadingService>, user: MaybeUser) -> ApiResult {
    let created = service.new_session(user.0).await?;

    Ok(HttpResponse::Ok().json(NewSessionResponse {
        session_id: created.session_id,
        message: created.greeting,
        is_authenticated: created.is_authenticated,
    }))
}

#[post("/submit-questions")]
pub async fn submit_questions(
    service: web::Data<ReadingService>,
    user: MaybeUser,
    req: web::Json<SubmitQuestionsRequest>,
) -> ApiResult {
    let req = req.into_inner();
    service
        .submit_questions(&req.session_id, req.responses, user.0)
        .await?;

    Ok(HttpResponse::Ok().json(json!({"success": true})))
}

#[post("/draw-cards")]
pub async fn draw_cards(
    service: web::Data<ReadingService>,
    user: MaybeUser,
    req: web::Json<DrawCardsRequest>,
) -> ApiResult {
    let req = req.into_inner();
    let result = service
        .draw_cards(
            DrawRequest {
                session_id: req.session_id,
                cards: req.cards,
                detail: req.reading_detail,
                save_to_account: req.save_to_account,
                reading_name: req.reading_name,
            },
            user.0,
        )
        .await?;

    Ok(HttpResponse::Ok().json(DrawCardsResponse {
        success: true,
        message: result.interpretation,
        reading_id: result.reading_id,
        unresolved_cards: result.warnings,
    }))
}

#[post("/message")]
pub async fn send_message(service: web::Data<ReadingService>, req: web::Json<MessageRequest>) -> ApiResult {
    let reply = service.send_message(&req.session_id, &req.message).await?;
    Ok(HttpResponse::Ok().json(json!({"message": reply})))
}

#[get("/message")]
pub async fn continue_reading(service: web::Data<ReadingService>, query: web::Query<SessionQuery>) -> ApiResult {
    let reply = service.continue_reading(&query.session_id).await?;
    Ok(HttpResponse::Ok().json(json!({"message": reply})))
}

#[get("/history")]
pub async fn get_history(service: web::Data<ReadingService>, query: web::Query<SessionQuery>) -> ApiResult {
    let history = service.history(&query.session_id)?;
    Ok(HttpResponse::Ok().json(json!({"history": history})))
}

#[post("/save-reading")]
pub async fn save_reading(
    service: web::Data<ReadingService>,
    user: AuthenticatedUser,
    req: web::Json<SaveReadingRequest>,
) -> ApiResult {
    let reading_id = service
        .save_reading(
            &req.session_id,
            req.reading_name.as_deref(),
            req.description.as_deref(),
            user.0,
        )
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Reading saved",
        "reading_id": reading_id,
    })))
}

// --- Cards ---

#[get("/tarot-cards")]
pub async fn tarot_cards(service: web::Data<ReadingService>) -> ApiResult {
    Ok(HttpResponse::Ok().json(service.catalog().list()))
}

#[get("/cards")]
pub async fn card_summaries(service: web::Data<ReadingService>) -> ApiResult {
    let cards: Vec<CardSummary> = service.catalog().list().iter().map(CardSummary::from).collect();
    Ok(HttpResponse::Ok().json(json!({"cards": cards})))
}

#[get("/random-subset-cards")]
pub async fn random_subset(
    service: web::Data<ReadingService>,
    query: web::Query<SubsetQuery>,
) -> ApiResult {
    let count = query.count.unwrap_or(service.policy().random_subset_default);
    let cards = service.catalog().sample(count);
    Ok(HttpResponse::Ok().json(json!({
        "total_count": cards.len(),
        "cards": cards,
    })))
}

// --- Account ---

#[get("/check-auth")]
pub async fn check_auth(service: web::Data<ReadingService>, user: MaybeUser) -> ApiResult {
    match user.0 {
        Some(user_id) => {
            let total_readings = service.reading_count(user_id)?;
            Ok(HttpResponse::Ok().json(json!({
                "authenticated": true,
                "user": {"id": user_id, "total_readings": total_readings},
            })))
        }
        None => Ok(HttpResponse::Ok().json(json!({"authenticated": false}))),
    }
}

#[get("/user/readings")]
pub async fn user_readings(
    service: web::Data<ReadingService>,
    user: AuthenticatedUser,
    query: web::Query<PaginationQuery>,
) -> ApiResult {
    let page = service.readings(user.0, query.limit, query.offset)?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "readings": page.readings,
        "total": page.total,
    })))
}

#[get("/user/readings/{id}")]
pub async fn user_reading(
    service: web::Data<ReadingService>,
    user: AuthenticatedUser,
    id: web::Path<i64>,
) -> ApiResult {
    let reading = service.reading(user.0, id.into_inner())?;
    Ok(HttpResponse::Ok().json(json!({"success": true, "reading": reading})))
}

#[get("/user/saved-layouts")]
pub async fn saved_layouts(service: web::Data<ReadingService>, user: AuthenticatedUser) -> ApiResult {
    let layouts = service.layouts(user.0)?;
    Ok(HttpResponse::Ok().json(json!({"success": true, "layouts": layouts})))
}

#[post("/user/save-layout")]
pub async fn save_layout(
    service: web::Data<ReadingService>,
    user: AuthenticatedUser,
    req: web::Json<SaveLayoutRequest>,
) -> ApiResult {
    let layout_id = service.save_layout(user.0, &req.name, req.description.as_deref(), &req.cards)?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Layout saved",
        "layout_id": layout_id,
    })))
}

#[delete("/user/delete-layout/{id}")]
pub async fn delete_layout(
    service: web::Data<ReadingService>,
    user: AuthenticatedUser,
    id: web::Path<i64>,
) -> ApiResult {
    service.delete_layout(user.0, id.into_inner())?;
    Ok(HttpResponse::Ok().json(json!({"success": true, "message": "Layout deleted"})))
}

/// Body and query extraction failures use the same JSON error shape as
/// every other failure.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .error_handler(|err, _req| ReadingError::validation(err.to_string()).into())
}

pub fn query_config() -> web::QueryConfig {
    web::QueryConfig::default()
        .error_handler(|err, _req| ReadingError::validation(err.to_string()).into())
}

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({"status": "healthy"}))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .app_data(query_config())
        .route("/health", web::get().to(health))
        .service(
        web::scope("/api")
            .service(new_session)
            .service(submit_questions)
            .service(draw_cards)
            .service(send_message)
            .service(continue_reading)
            .service(get_history)
            .service(save_reading)
            .service(tarot_cards)
            .service(card_summaries)
            .service(random_subset)
            .service(check_auth)
            .service(user_readings)
            .service(user_reading)
            .service(saved_layouts)
            .service(save_layout)
            .service(delete_layout),
    );
}
