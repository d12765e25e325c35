fn apply_cors_headers(headers: &mut axum::http::HeaderMap) {
    headers.insert(
        HeaderName::from_static("access-control-allow-origin"),
        HeaderValue::from_static("*"),
    );
    headers.insert(
        HeaderName::from_static("access-control-allow-methods"),
        HeaderValue::from_static("GET, POST, PUT, PATCH, DELETE, OPTIONS"),
    );
    headers.insert(
        HeaderName::from_static("access-control-allow-headers"),
        HeaderValue::from_static("content-type"),
    );
}

/// Cursor pagination over an in-memory listing. The cursor is a plain start
/// index; out-of-range cursors are rejected rather than clamped.
fn paginate(
    total: usize,
    cursor: Option<usize>,
    page_size: Option<usize>,
) -> Result<(usize, usize, Option<usize>), HttpApiError> {
    let start = cursor.unwrap_or(0);
    if start > total {
        return Err(HttpApiError::invalid_query(
            "cursor is out of range",
            Some(format!("cursor={start} total={total}")),
        ));
    }
    let page_size = page_size.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE);
    if page_size == 0 {
        return Err(HttpApiError::invalid_query("page_size must be positive", None));
    }
    let end = (start + page_size).min(total);
    let next_cursor = if end < total { Some(end) } else { None };
    Ok((start, end, next_cursor))
}
