#[derive(Debug, Deserialize)]
struct EvaluateBody {
    beneficiary_id: String,
    item_id: i64,
    quantity: f64,
}

async fn evaluate_distribution(
    State(state): State<AppState>,
    Json(body): Json<EvaluateBody>,
) -> Json<contracts::EvaluationReport> {
    let inner = state.inner.lock().await;
    Json(inner.evaluate_distribution(&body.beneficiary_id, body.item_id, body.quantity, Utc::now()))
}

#[derive(Debug, Deserialize, Default)]
struct LeastServedQuery {
    category: Option<String>,
    limit: Option<usize>,
}

async fn least_served(
    State(state): State<AppState>,
    Query(query): Query<LeastServedQuery>,
) -> Json<Vec<contracts::LeastServedBeneficiary>> {
    let inner = state.inner.lock().await;
    Json(inner.least_served(
        query.category.as_deref(),
        query.limit.unwrap_or(DEFAULT_TOP_N),
        Utc::now(),
    ))
}

async fn get_policy(State(state): State<AppState>) -> Json<contracts::PolicyConfig> {
    let inner = state.inner.lock().await;
    Json(inner.policy().clone())
}

#[derive(Debug, Deserialize)]
struct PolicyOverrideBody {
    category: String,
    item: String,
    max_quantity: f64,
    window_days: u32,
}

async fn override_policy(
    State(state): State<AppState>,
    Json(body): Json<PolicyOverrideBody>,
) -> Result<Json<contracts::PolicyConfig>, HttpApiError> {
    if !(body.max_quantity > 0.0) {
        return Err(HttpApiError::invalid_query(
            "max_quantity must be greater than zero",
            None,
        ));
    }
    if body.window_days == 0 {
        return Err(HttpApiError::invalid_query(
            "window_days must be at least one day",
            None,
        ));
    }
    let mut inner = state.inner.lock().await;
    let next = inner.override_policy_cap(
        &body.category,
        &body.item,
        body.max_quantity,
        body.window_days,
    );
    Ok(Json(next))
}

#[derive(Debug, Deserialize, Default)]
struct EquityQuery {
    window_days: Option<u32>,
    top: Option<usize>,
}

async fn equity_report(
    State(state): State<AppState>,
    Query(query): Query<EquityQuery>,
) -> Json<contracts::EquityReport> {
    let inner = state.inner.lock().await;
    Json(inner.equity_report(
        query.window_days.unwrap_or(DEFAULT_EQUITY_WINDOW_DAYS),
        query.top.unwrap_or(DEFAULT_TOP_N),
        Utc::now(),
    ))
}
