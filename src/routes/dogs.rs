use askama::Template;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;

use crate::dogs::{DogEditForm, DogForm, DogId, DogRecord};
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, MaybeUser, ValidForm};
use crate::routes::home::Html;
use crate::state::AppState;

// -- Templates --

#[derive(Template)]
#[template(path = "dogs/index.html")]
pub struct DogsIndexTemplate {
    pub viewer: Option<String>,
    pub dogs: Vec<DogRecord>,
}

#[derive(Template)]
#[template(path = "dogs/show.html")]
pub struct DogShowTemplate {
    pub viewer: Option<String>,
    pub dog: DogRecord,
}

#[derive(Template)]
#[template(path = "dogs/new.html")]
pub struct DogNewTemplate {
    pub viewer: Option<String>,
    pub form: FormValues,
    pub error: Option<String>,
}

#[derive(Template)]
#[template(path = "dogs/edit.html")]
pub struct DogEditTemplate {
    pub viewer: Option<String>,
    pub dog_id: String,
    pub form: FormValues,
    pub error: Option<String>,
}

/// Text shown in the create/edit inputs.
#[derive(Debug, Default, Clone)]
pub struct FormValues {
    pub name: String,
    pub age_yr: String,
    pub age_mo: String,
    pub breed: String,
    pub location: String,
    pub image: String,
    pub description: String,
    pub adopted: bool,
}

fn text(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

impl From<&DogRecord> for FormValues {
    fn from(dog: &DogRecord) -> Self {
        Self {
            name: dog.name.clone(),
            age_yr: dog.age_yr.map(|y| y.to_string()).unwrap_or_default(),
            age_mo: dog.age_mo.map(|m| m.to_string()).unwrap_or_default(),
            breed: dog.breed.clone(),
            location: dog.location.clone(),
            image: dog.image.clone(),
            description: text(&dog.description),
            adopted: dog.adopted,
        }
    }
}

impl From<&DogForm> for FormValues {
    fn from(form: &DogForm) -> Self {
        Self {
            name: text(&form.name),
            age_yr: text(&form.age_yr),
            age_mo: text(&form.age_mo),
            breed: text(&form.breed),
            location: text(&form.location),
            image: text(&form.image),
            description: text(&form.description),
            adopted: false,
        }
    }
}

impl FormValues {
    /// Submitted edit values layered over the stored record.
    fn edited(dog: &DogRecord, form: &DogEditForm) -> Self {
        let mut values = Self::from(dog);
        let overlay = [
            (&mut values.name, &form.name),
            (&mut values.age_yr, &form.age_yr),
            (&mut values.age_mo, &form.age_mo),
            (&mut values.breed, &form.breed),
            (&mut values.location, &form.location),
            (&mut values.image, &form.image),
            (&mut values.description, &form.description),
        ];
        for (slot, submitted) in overlay {
            if let Some(v) = submitted {
                *slot = v.clone();
            }
        }
        values
    }
}

// -- Handlers --

/// GET /dogs: all dogs
async fn index(State(state): State<AppState>, maybe_user: MaybeUser) -> AppResult<Response> {
    let dogs = state.dogs.list().await?;
    Ok(Html(DogsIndexTemplate {
        viewer: maybe_user.viewer(),
        dogs,
    })
    .into_response())
}

/// GET /dogs/new: creation form
async fn new_form(user: CurrentUser) -> Html<DogNewTemplate> {
    Html(DogNewTemplate {
        viewer: Some(user.username().to_string()),
        form: FormValues::default(),
        error: None,
    })
}

/// POST /dogs: create and go back to the list
async fn create(
    State(state): State<AppState>,
    user: CurrentUser,
    ValidForm(form): ValidForm<DogForm>,
) -> AppResult<Response> {
    let new_dog = match form.validate() {
        Ok(dog) => dog,
        Err(AppError::MalformedInput(message)) => {
            let page = DogNewTemplate {
                viewer: Some(user.username().to_string()),
                form: FormValues::from(&form),
                error: Some(message),
            };
            return Ok((StatusCode::UNPROCESSABLE_ENTITY, Html(page)).into_response());
        }
        Err(e) => return Err(e),
    };

    state.dogs.create(new_dog).await?;
    Ok(Redirect::to("/dogs").into_response())
}

/// GET /dogs/{id}: detail page
async fn show(
    State(state): State<AppState>,
    maybe_user: MaybeUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let id: DogId = id.parse()?;
    let dog = state.dogs.get(&id).await?;
    Ok(Html(DogShowTemplate {
        viewer: maybe_user.viewer(),
        dog,
    })
    .into_response())
}

/// GET /dogs/{id}/edit: edit form pre-filled from the stored record
async fn edit_form(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let id: DogId = id.parse()?;
    let dog = state.dogs.get(&id).await?;
    Ok(Html(DogEditTemplate {
        viewer: Some(user.username().to_string()),
        dog_id: id.to_string(),
        form: FormValues::from(&dog),
        error: None,
    })
    .into_response())
}

/// PUT /dogs/{id}: partial update, then back to the detail page
async fn update(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    ValidForm(form): ValidForm<DogEditForm>,
) -> AppResult<Response> {
    let id: DogId = id.parse()?;

    let changes = match form.validate() {
        Ok(changes) => changes,
        Err(AppError::MalformedInput(message)) => {
            let dog = state.dogs.get(&id).await?;
            let page = DogEditTemplate {
                viewer: Some(user.username().to_string()),
                dog_id: id.to_string(),
                form: FormValues::edited(&dog, &form),
                error: Some(message),
            };
            return Ok((StatusCode::UNPROCESSABLE_ENTITY, Html(page)).into_response());
        }
        Err(e) => return Err(e),
    };

    state.dogs.update(&id, changes).await?;
    Ok(Redirect::to(&format!("/dogs/{}", id)).into_response())
}

/// DELETE /dogs/{id}: remove, then back to the landing page
async fn destroy(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    // A malformed id can't name a stored dog, so it is as gone as a missing one.
    let result = match id.parse::<DogId>() {
        Ok(id) => state.dogs.delete(&id).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => {}
        Err(AppError::NotFound) => tracing::debug!(dog_id = %id, "Delete of missing dog"),
        Err(e) => return Err(e),
    }
    Ok(Redirect::to("/").into_response())
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dogs", get(index).post(create))
        .route("/dogs/new", get(new_form))
        .route("/dogs/{id}", get(show).put(update).delete(destroy))
        .route("/dogs/{id}/edit", get(edit_form))
}
