#[derive(Debug, Deserialize, Default)]
struct ItemsQuery {
    search: Option<String>,
    category: Option<String>,
    institution_id: Option<i64>,
}

#[derive(Debug, Serialize)]
struct ItemWithStock {
    #[serde(flatten)]
    item: contracts::StockItem,
    on_hand_global: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    on_hand_institution: Option<f64>,
}

async fn list_items(
    State(state): State<AppState>,
    Query(query): Query<ItemsQuery>,
) -> Json<Vec<ItemWithStock>> {
    let inner = state.inner.lock().await;
    let network = inner.network();
    let items = network
        .registry
        .active_items(query.category.as_deref(), query.search.as_deref())
        .into_iter()
        .map(|item| ItemWithStock {
            on_hand_global: abrigo_core::ledger::total_on_hand(network.ledger.entries(), item.id),
            on_hand_institution: query.institution_id.map(|institution_id| {
                abrigo_core::ledger::on_hand_for_institution(
                    network.ledger.entries(),
                    item.id,
                    institution_id,
                )
            }),
            item: item.clone(),
        })
        .collect();
    Json(items)
}

async fn create_item(
    State(state): State<AppState>,
    Json(new): Json<NewStockItem>,
) -> Result<(StatusCode, Json<contracts::StockItem>), HttpApiError> {
    let mut inner = state.inner.lock().await;
    let item = inner.add_item(&new, Utc::now()).map_err(HttpApiError::from)?;
    Ok((StatusCode::CREATED, Json(item)))
}

#[derive(Debug, Deserialize, Default)]
struct OnHandQuery {
    institution_id: Option<i64>,
}

async fn get_on_hand(
    Path(item_id): Path<i64>,
    State(state): State<AppState>,
    Query(query): Query<OnHandQuery>,
) -> Result<Json<serde_json::Value>, HttpApiError> {
    let inner = state.inner.lock().await;
    let on_hand = inner
        .on_hand(item_id, query.institution_id)
        .map_err(|err| HttpApiError::from(&err))?;
    Ok(Json(json!({
        "item_id": item_id,
        "institution_id": query.institution_id,
        "on_hand": on_hand,
    })))
}

async fn list_categories(State(state): State<AppState>) -> Json<Vec<String>> {
    let inner = state.inner.lock().await;
    Json(inner.network().registry.categories())
}

async fn register_entry(
    State(state): State<AppState>,
    Json(request): Json<EntryRequest>,
) -> Result<(StatusCode, Json<contracts::LedgerEntry>), HttpApiError> {
    let mut inner = state.inner.lock().await;
    let entry = inner
        .register_entry(&request, Utc::now())
        .map_err(HttpApiError::from)?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn request_exit(
    State(state): State<AppState>,
    Json(request): Json<ExitRequest>,
) -> Result<Json<contracts::ExitOutcome>, HttpApiError> {
    let mut inner = state.inner.lock().await;
    let outcome = inner
        .request_exit(&request, Utc::now())
        .map_err(HttpApiError::from)?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize, Default)]
struct MovementsQuery {
    institution_id: i64,
    direction: Option<contracts::Direction>,
    item_id: Option<i64>,
    from: Option<chrono::DateTime<Utc>>,
    to: Option<chrono::DateTime<Utc>>,
    cursor: Option<usize>,
    page_size: Option<usize>,
}

#[derive(Debug, Serialize)]
struct MovementPage {
    schema_version: String,
    cursor: usize,
    next_cursor: Option<usize>,
    total: usize,
    movements: Vec<contracts::LedgerEntry>,
}

async fn list_movements(
    State(state): State<AppState>,
    Query(query): Query<MovementsQuery>,
) -> Result<Json<MovementPage>, HttpApiError> {
    let inner = state.inner.lock().await;
    let filter = MovementFilter {
        direction: query.direction,
        item_id: query.item_id,
        from: query.from,
        to: query.to,
    };
    let movements = inner.movements(query.institution_id, &filter);
    let (start, end, next_cursor) = paginate(movements.len(), query.cursor, query.page_size)?;

    Ok(Json(MovementPage {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        cursor: start,
        next_cursor,
        total: movements.len(),
        movements: movements[start..end].to_vec(),
    }))
}

async fn annotate_movement(
    Path(entry_id): Path<u64>,
    State(state): State<AppState>,
    Query(scope): Query<InstitutionScope>,
    Json(annotation): Json<EntryAnnotation>,
) -> Result<Json<contracts::LedgerEntry>, HttpApiError> {
    let mut inner = state.inner.lock().await;
    let entry = inner
        .annotate_entry(entry_id, scope.institution_id, &annotation)
        .map_err(HttpApiError::from)?;
    Ok(Json(entry))
}

async fn stock_overview(
    State(state): State<AppState>,
    Query(scope): Query<InstitutionScope>,
) -> Json<serde_json::Value> {
    let inner = state.inner.lock().await;
    Json(inner.stock_overview(scope.institution_id))
}
