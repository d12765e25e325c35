#[derive(Debug, Deserialize)]
struct BeneficiarySearchQuery {
    institution_id: i64,
    #[serde(default)]
    search: Option<String>,
}

async fn search_beneficiaries(
    State(state): State<AppState>,
    Query(query): Query<BeneficiarySearchQuery>,
) -> Json<Vec<contracts::Beneficiary>> {
    let inner = state.inner.lock().await;
    let found = inner
        .network()
        .registry
        .search_beneficiaries(query.institution_id, query.search.as_deref().unwrap_or(""))
        .into_iter()
        .cloned()
        .collect();
    Json(found)
}

async fn register_beneficiary(
    State(state): State<AppState>,
    Query(scope): Query<InstitutionScope>,
    Json(new): Json<NewBeneficiary>,
) -> Result<(StatusCode, Json<contracts::Beneficiary>), HttpApiError> {
    let mut inner = state.inner.lock().await;
    let beneficiary = inner
        .register_beneficiary(&new, Some(scope.institution_id), Utc::now())
        .map_err(HttpApiError::from)?;
    Ok((StatusCode::CREATED, Json(beneficiary)))
}

async fn update_beneficiary(
    Path(national_id): Path<String>,
    State(state): State<AppState>,
    Query(scope): Query<InstitutionScope>,
    Json(update): Json<BeneficiaryUpdate>,
) -> Result<Json<contracts::Beneficiary>, HttpApiError> {
    let mut inner = state.inner.lock().await;

    // Profile mutation stays with the registering institution; lookups are
    // global, writes are not.
    let owner = inner
        .network()
        .registry
        .beneficiary(&national_id)
        .ok_or_else(|| {
            HttpApiError::not_found("beneficiary not found in the system", None)
        })?
        .registered_by;
    if owner != Some(scope.institution_id) {
        return Err(HttpApiError {
            status: StatusCode::FORBIDDEN,
            error: ApiError::new(
                ErrorCode::Conflict,
                "only the registering institution may update this profile",
                Some(format!("national_id={national_id}")),
            ),
        });
    }

    let beneficiary = inner
        .update_beneficiary(&national_id, &update)
        .map_err(HttpApiError::from)?;
    Ok(Json(beneficiary))
}

async fn lookup_beneficiary(
    Path(national_id): Path<String>,
    State(state): State<AppState>,
    Query(scope): Query<InstitutionScope>,
) -> Result<Json<contracts::LookupResult>, HttpApiError> {
    let inner = state.inner.lock().await;
    inner
        .lookup_beneficiary(&national_id, scope.institution_id, Utc::now())
        .map(Json)
        .ok_or_else(|| HttpApiError::not_found("beneficiary not found in the system", None))
}
