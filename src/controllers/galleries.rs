use axum::{
    extract::{
        multipart::{Field, MultipartError},
        DefaultBodyLimit, Multipart, Path, State,
    },
    http::StatusCode,
    middleware::from_fn,
    response::Response,
    routing::{get, post},
    Form, Router,
};
use serde::Deserialize;
use thiserror::Error;
use tokio::{fs::File, io::AsyncWriteExt};
use tower_cookies::Cookies;
use tracing::{error, info, instrument};

use crate::middleware::{require_user, AuthUser};
use crate::models::{Gallery, GalleryDb, Image, ModelError, User};
use crate::state::AppState;
use crate::views::{galleries as pages, redirect, redirect_alert, Alert, Layout, PublicError, View};

const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

type HandlerError = (StatusCode, &'static str);

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(read_router())
        .merge(write_router())
}

/// Pages anyone may see.
pub fn read_router() -> Router<AppState> {
    Router::new().route("/galleries/:id", get(show))
}

/// Everything else needs a signed-in user.
pub fn write_router() -> Router<AppState> {
    Router::new()
        .route("/galleries", get(index).post(create))
        .route("/galleries/new", get(new))
        .route("/galleries/:id/edit", get(edit))
        .route("/galleries/:id/update", post(update))
        .route("/galleries/:id/delete", post(delete))
        .route(
            "/galleries/:id/images",
            post(image_upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/galleries/:id/images/:filename/delete", post(image_delete))
        .route_layer(from_fn(require_user))
}

#[derive(Default, Deserialize)]
#[serde(default)]
pub struct GalleryForm {
    pub title: String,
}

/// Resolve a path id to a gallery, mapping failures to plain error pages.
async fn gallery_by_id(state: &AppState, raw_id: &str) -> Result<Gallery, HandlerError> {
    let id = raw_id
        .parse::<u64>()
        .ok()
        .and_then(|id| i64::try_from(id).ok())
        .ok_or((StatusCode::NOT_FOUND, "Invalid gallery ID"))?;

    match state.services.gallery.by_id(id).await {
        Ok(gallery) => Ok(gallery),
        Err(e) if e.is_not_found() => Err((StatusCode::NOT_FOUND, "Gallery not found")),
        Err(e) => {
            error!(error = %e, gallery_id = id, "gallery lookup failed");
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Whoops! Something went wrong."))
        }
    }
}

/// Attach the gallery's images, or leave it empty and alert.
async fn load_images(state: &AppState, view: &mut View, gallery: &mut Gallery) {
    match state.services.image.by_gallery_id(gallery.id).await {
        Ok(images) => gallery.images = images,
        Err(e) => view.set_alert(&e),
    }
}

fn owns(user: &User, gallery: &Gallery) -> bool {
    gallery.user_id == user.id
}

fn edit_page(view: View, gallery: &Gallery) -> Response {
    let body = pages::edit(view.csrf_token(), gallery);
    view.render(Layout::Bootstrap, body)
}

/// GET /galleries/new
pub async fn new(view: View) -> Response {
    let body = pages::new(view.csrf_token(), "");
    view.render(Layout::Bootstrap, body)
}

/// POST /galleries
#[instrument(skip_all, fields(user_id = user.id))]
pub async fn create(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    mut view: View,
    Form(form): Form<GalleryForm>,
) -> Response {
    let mut gallery = Gallery::new(user.id, form.title.clone());
    if let Err(e) = state.services.gallery.create(&mut gallery).await {
        view.set_alert(&e);
        let body = pages::new(view.csrf_token(), &form.title);
        return view.render(Layout::Bootstrap, body);
    }
    info!(gallery_id = gallery.id, "gallery created");
    redirect(&format!("/galleries/{}/edit", gallery.id))
}

/// GET /galleries
#[instrument(skip_all, fields(user_id = user.id))]
pub async fn index(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    view: View,
) -> Result<Response, HandlerError> {
    let galleries = state
        .services
        .gallery
        .by_user_id(user.id)
        .await
        .map_err(|e| {
            error!(error = %e, "listing galleries failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong.")
        })?;
    Ok(view.render(Layout::Bootstrap, pages::index(&galleries)))
}

/// GET /galleries/:id
#[instrument(skip_all, fields(gallery = %id))]
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<String>,
    mut view: View,
) -> Result<Response, HandlerError> {
    let mut gallery = gallery_by_id(&state, &id).await?;
    load_images(&state, &mut view, &mut gallery).await;
    Ok(view.render(Layout::Bootstrap, pages::show(&gallery)))
}

/// GET /galleries/:id/edit
#[instrument(skip_all, fields(user_id = user.id))]
pub async fn edit(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    mut view: View,
) -> Result<Response, HandlerError> {
    let mut gallery = gallery_by_id(&state, &id).await?;
    if !owns(&user, &gallery) {
        return Err((
            StatusCode::FORBIDDEN,
            "You do not have permission to edit this gallery",
        ));
    }
    load_images(&state, &mut view, &mut gallery).await;
    Ok(edit_page(view, &gallery))
}

/// POST /galleries/:id/update
#[instrument(skip_all, fields(user_id = user.id))]
pub async fn update(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    cookies: Cookies,
    mut view: View,
    Form(form): Form<GalleryForm>,
) -> Result<Response, HandlerError> {
    let mut gallery = gallery_by_id(&state, &id).await?;
    if !owns(&user, &gallery) {
        return Err((StatusCode::NOT_FOUND, "Gallery not found"));
    }

    gallery.title = form.title;
    if let Err(e) = state.services.gallery.update(&mut gallery).await {
        view.set_alert(&e);
        load_images(&state, &mut view, &mut gallery).await;
        return Ok(edit_page(view, &gallery));
    }
    Ok(redirect_alert(
        &cookies,
        "/galleries",
        Alert::success("Gallery successfully updated!"),
    ))
}

/// POST /galleries/:id/delete
#[instrument(skip_all, fields(user_id = user.id))]
pub async fn delete(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    mut view: View,
) -> Result<Response, HandlerError> {
    let mut gallery = gallery_by_id(&state, &id).await?;
    if !owns(&user, &gallery) {
        return Err((
            StatusCode::FORBIDDEN,
            "You do not have permission to edit this gallery",
        ));
    }

    if let Err(e) = state.services.gallery.delete(gallery.id).await {
        view.set_alert(&e);
        load_images(&state, &mut view, &mut gallery).await;
        return Ok(edit_page(view, &gallery));
    }
    info!(gallery_id = gallery.id, "gallery deleted");
    Ok(redirect("/galleries"))
}

#[derive(Debug, Error)]
enum UploadError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("reading upload: {0}")]
    Multipart(#[from] MultipartError),
}

impl PublicError for UploadError {
    fn public(&self) -> Option<String> {
        match self {
            UploadError::Model(e) => e.public(),
            UploadError::Multipart(e) => Some(e.body_text()),
        }
    }
}

async fn write_field(field: &mut Field<'_>, mut file: File) -> Result<(), UploadError> {
    while let Some(chunk) = field.chunk().await? {
        file.write_all(&chunk).await.map_err(ModelError::from)?;
    }
    file.flush().await.map_err(ModelError::from)?;
    Ok(())
}

/// Stream every `images` file part to disk, then mirror it. A part that
/// fails midway leaves nothing behind.
async fn save_uploads(
    state: &AppState,
    gallery_id: i64,
    multipart: &mut Multipart,
) -> Result<usize, UploadError> {
    let images = &state.services.image;
    let mut saved = 0;
    while let Some(mut field) = multipart.next_field().await? {
        if field.name() != Some("images") {
            continue;
        }
        let Some(filename) = field.file_name().filter(|n| !n.is_empty()).map(str::to_string) else {
            continue;
        };

        let (file, pending) = images.open_writer(gallery_id, &filename).await?;
        if let Err(e) = write_field(&mut field, file).await {
            images.discard(pending).await;
            return Err(e);
        }
        let image = images.commit(pending).await?;
        images.publish(&image).await?;
        saved += 1;
    }
    Ok(saved)
}

/// POST /galleries/:id/images
#[instrument(skip_all, fields(user_id = user.id))]
pub async fn image_upload(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    mut view: View,
    mut multipart: Multipart,
) -> Result<Response, HandlerError> {
    let mut gallery = gallery_by_id(&state, &id).await?;
    if !owns(&user, &gallery) {
        return Err((StatusCode::FORBIDDEN, "Gallery not found"));
    }

    match save_uploads(&state, gallery.id, &mut multipart).await {
        Ok(saved) => {
            info!(gallery_id = gallery.id, saved, "images uploaded");
            view.alert(Alert::success("Images successfully uploaded"));
        }
        Err(e) => view.set_alert(&e),
    }
    load_images(&state, &mut view, &mut gallery).await;
    Ok(edit_page(view, &gallery))
}

/// POST /galleries/:id/images/:filename/delete
#[instrument(skip_all, fields(user_id = user.id))]
pub async fn image_delete(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((id, filename)): Path<(String, String)>,
    mut view: View,
) -> Result<Response, HandlerError> {
    let mut gallery = gallery_by_id(&state, &id).await?;
    if !owns(&user, &gallery) {
        return Err((
            StatusCode::FORBIDDEN,
            "You do not have permission to edit this gallery",
        ));
    }

    let image = Image {
        gallery_id: gallery.id,
        filename,
    };
    if let Err(e) = state.services.image.delete(&image).await {
        view.set_alert(&e);
        load_images(&state, &mut view, &mut gallery).await;
        return Ok(edit_page(view, &gallery));
    }
    Ok(redirect(&format!("/galleries/{}/edit", gallery.id)))
}
