#[derive(Clone)]
struct AppState {
    inner: std::sync::Arc<Mutex<ReliefApi>>,
}

impl AppState {
    fn new(api: ReliefApi) -> Self {
        Self {
            inner: std::sync::Arc::new(Mutex::new(api)),
        }
    }
}

/// The routing layer trusts an already-resolved institution identity; every
/// scoped endpoint carries it explicitly.
#[derive(Debug, Deserialize)]
struct InstitutionScope {
    institution_id: i64,
}
