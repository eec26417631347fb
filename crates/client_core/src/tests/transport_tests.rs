use super::*;
use std::collections::HashMap;

use axum::{extract::Query, http::StatusCode, routing::get, Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

type Params = Query<HashMap<String, String>>;

async fn career(Query(params): Params) -> Result<Json<Value>, StatusCode> {
    if params.get("ck").map(String::as_str) == Some("broken") {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    Ok(Json(json!({
        "seasonid": params.get("seasonid"),
        "ck": params.get("ck"),
    })))
}

async fn assets(Query(params): Params) -> Json<Value> {
    match params.get("ck").map(String::as_str) {
        Some("empty") => Json(Value::Null),
        _ => Json(json!(["12,000", "3", "87"])),
    }
}

async fn accessories(Query(params): Params) -> Json<Value> {
    let size = match params.get("page").map(String::as_str) {
        Some("1") => 50,
        Some("2") => 3,
        _ => 0,
    };
    let items: Vec<Value> = (0..size)
        .map(|index| json!({ "index": index, "ck": params.get("ck") }))
        .collect();
    Json(Value::Array(items))
}

async fn person_resource(Query(params): Params) -> Json<Value> {
    Json(json!({
        "ck": params.get("ck"),
        "seasonid": params.get("seasonid"),
        "all_seasons": params.get("all_seasons"),
    }))
}

async fn collects(Query(params): Params) -> Json<Value> {
    match params.get("ck").map(String::as_str) {
        Some("empty") => Json(Value::Null),
        _ => Json(json!({ "itemidList": { "p-1": "2", "p-9": "1" } })),
    }
}

async fn spawn_profile_server() -> HttpProfileApi {
    let router = Router::new()
        .route("/api/career", get(career))
        .route("/api/assets", get(assets))
        .route("/api/accessories", get(accessories))
        .route("/api/person-resource", get(person_resource))
        .route("/api/collects", get(collects));
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve");
    });
    HttpProfileApi::new(&format!("http://{addr}/api")).expect("api client")
}

#[test]
fn base_url_gains_trailing_slash() {
    let api = HttpProfileApi::new("http://127.0.0.1:9000/api").expect("api client");
    assert_eq!(api.base_url().as_str(), "http://127.0.0.1:9000/api/");
}

#[test]
fn rejects_unparseable_base_url() {
    assert!(HttpProfileApi::new("not a url").is_err());
}

#[tokio::test]
async fn career_request_carries_season_and_credential() {
    let api = spawn_profile_server().await;
    let data = api
        .fetch_career(&SeasonId::from("4"), &Credential::from("tok"))
        .await
        .expect("career");
    assert_eq!(
        data,
        Some(CareerData(json!({ "seasonid": "4", "ck": "tok" })))
    );
}

#[tokio::test]
async fn server_error_is_a_transport_failure() {
    let api = spawn_profile_server().await;
    let result = api
        .fetch_career(&SeasonId::from("4"), &Credential::from("broken"))
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn null_body_means_no_data() {
    let api = spawn_profile_server().await;
    let assets = api
        .fetch_assets(&Credential::from("empty"))
        .await
        .expect("assets");
    assert!(assets.is_none());

    let assets = api
        .fetch_assets(&Credential::from("tok"))
        .await
        .expect("assets");
    assert_eq!(assets, Some(AssetTriple::new("12,000", "3", "87")));
}

#[tokio::test]
async fn accessory_pages_are_requested_by_number() {
    let api = spawn_profile_server().await;
    let credential = Credential::from("tok");
    let first = api
        .fetch_accessory_page(1, &credential)
        .await
        .expect("page 1")
        .expect("page 1 items");
    let second = api
        .fetch_accessory_page(2, &credential)
        .await
        .expect("page 2")
        .expect("page 2 items");
    assert_eq!(first.len(), 50);
    assert_eq!(second.len(), 3);
    assert_eq!(second[0].0["ck"], json!("tok"));
}

#[tokio::test]
async fn person_resource_sends_all_seasons_flag() {
    let api = spawn_profile_server().await;
    let resource = api
        .fetch_person_resource(&Credential::from("tok"), &SeasonId::from("5"), true)
        .await
        .expect("person resource");
    assert_eq!(
        resource,
        Some(PersonResource(
            json!({ "ck": "tok", "seasonid": "5", "all_seasons": "true" })
        ))
    );
}

#[tokio::test]
async fn collects_decode_item_counts() {
    let api = spawn_profile_server().await;
    let response = api
        .fetch_collects(&Credential::from("tok"))
        .await
        .expect("collects")
        .expect("collects body");
    assert_eq!(response.count_for("p-1"), "2");
    assert_eq!(response.count_for("missing"), "0");

    let empty = api
        .fetch_collects(&Credential::from("empty"))
        .await
        .expect("collects");
    assert!(empty.is_none());
}

#[tokio::test]
async fn unreachable_server_is_a_transport_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let api = HttpProfileApi::new(&format!("http://{addr}/")).expect("api client");
    assert!(api.fetch_assets(&Credential::from("tok")).await.is_err());
}
