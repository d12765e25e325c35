async fn list_institutions(State(state): State<AppState>) -> Json<Vec<contracts::Institution>> {
    let inner = state.inner.lock().await;
    Json(inner.network().registry.institutions().cloned().collect())
}

async fn register_institution(
    State(state): State<AppState>,
    Json(new): Json<NewInstitution>,
) -> Result<(StatusCode, Json<contracts::Institution>), HttpApiError> {
    let mut inner = state.inner.lock().await;
    let institution = inner
        .register_institution(&new, Utc::now())
        .map_err(HttpApiError::from)?;
    Ok((StatusCode::CREATED, Json(institution)))
}

async fn pending_institutions(State(state): State<AppState>) -> Json<Vec<contracts::Institution>> {
    let inner = state.inner.lock().await;
    Json(
        inner
            .network()
            .registry
            .pending_institutions()
            .into_iter()
            .cloned()
            .collect(),
    )
}

#[derive(Debug, Deserialize)]
struct ApprovalBody {
    approved_by: String,
}

async fn approve_institution(
    Path(institution_id): Path<i64>,
    State(state): State<AppState>,
    Json(body): Json<ApprovalBody>,
) -> Result<Json<contracts::Institution>, HttpApiError> {
    let mut inner = state.inner.lock().await;
    let institution = inner
        .approve_institution(institution_id, &body.approved_by, Utc::now())
        .map_err(HttpApiError::from)?;
    Ok(Json(institution))
}

async fn deactivate_institution(
    Path(institution_id): Path<i64>,
    State(state): State<AppState>,
) -> Result<StatusCode, HttpApiError> {
    let mut inner = state.inner.lock().await;
    inner
        .deactivate_institution(institution_id)
        .map_err(HttpApiError::from)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn remove_institution(
    Path(institution_id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<contracts::InstitutionRemoval>, HttpApiError> {
    let mut inner = state.inner.lock().await;
    let removal = inner
        .remove_institution(institution_id)
        .map_err(HttpApiError::from)?;
    Ok(Json(removal))
}
