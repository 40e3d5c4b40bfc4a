use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::http::ApiClient;

use super::path_segment;

/// `GET /api/search/condition`: the filter options offered by search.
pub async fn search_conditions(api: &ApiClient) -> Result<Value> {
    api.get("/api/search/condition").await
}

/// `GET /api/search/attractions?<params>`.
pub async fn search_attractions<Q: Serialize + ?Sized>(api: &ApiClient, params: &Q) -> Result<Value> {
    api.get_with_query("/api/search/attractions", params).await
}

/// `GET /api/search/attractions/{id}`.
pub async fn attraction_detail(api: &ApiClient, attraction_id: &str) -> Result<Value> {
    let id = path_segment("attraction id", attraction_id)?;
    api.get(&format!("/api/search/attractions/{id}")).await
}

/// `GET /api/search/local?metropolitanCode=`: districts of a metropolitan area.
pub async fn local_areas(api: &ApiClient, metropolitan_code: &str) -> Result<Value> {
    api.get_with_query(
        "/api/search/local",
        &[("metropolitanCode", metropolitan_code)],
    )
    .await
}

/// `GET /api/search/contents-type`.
pub async fn content_types(api: &ApiClient) -> Result<Value> {
    api.get("/api/search/contents-type").await
}
