use actix_web::{HttpResponse, Responder, get, post, web};
use log::info;

use super::models::{AppState, BlockView, ChainResponse, PeersResponse, SyncRequest, SyncResponse};

/// Every block in the tree, breadth-first from the root.
#[get("/chain/")]
pub async fn get_chain(state: web::Data<AppState>) -> impl Responder {
    let node = &state.node;
    let chain = node.chain();
    let blocks: Vec<BlockView> = chain.blocks().into_iter().map(BlockView::from).collect();
    HttpResponse::Ok().json(ChainResponse {
        node_address: node.address().to_string(),
        length: blocks.len(),
        height: chain.height(),
        latest_hash: chain.get_latest_block().hash(),
        blocks,
    })
}

/// First block with the given index, breadth-first.
#[get("/chain/{index}/")]
pub async fn get_block_at(state: web::Data<AppState>, path: web::Path<u64>) -> impl Responder {
    let index = path.into_inner();
    match state.node.chain().get_block_by_index(index) {
        Some(block) => HttpResponse::Ok().json(BlockView::from(block)),
        None => HttpResponse::NotFound().body(format!("no block at index {index}")),
    }
}

#[get("/peers/")]
pub async fn get_peers(state: web::Data<AppState>) -> impl Responder {
    let peers = state.node.peers().all();
    HttpResponse::Ok().json(PeersResponse {
        node_address: state.node.address().to_string(),
        count: peers.len(),
        peers,
    })
}

/// Ask a peer for the blocks we are missing. The exchange runs in the
/// background; the response only confirms it was started.
#[post("/sync/")]
pub async fn post_sync(state: web::Data<AppState>, req: web::Json<SyncRequest>) -> impl Responder {
    let address = req.address.trim().to_string();
    if address.is_empty() {
        return HttpResponse::BadRequest().body("address required");
    }

    let node = state.node.clone();
    let latest_hash = node.chain().get_latest_block().hash();
    info!("HTTP - sync requested from {address}");
    let peer = address.clone();
    actix_web::rt::spawn(async move { node.request_sync(&peer).await });

    HttpResponse::Accepted().json(SyncResponse {
        requested: address,
        latest_hash,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use actix_web::http::StatusCode;
    use actix_web::{App, test, web};
    use serde_json::Value;

    use crate::api::{AppState, init_routes};
    use crate::blockchain::testutil::{extend, fast_chain};
    use crate::config::NodeConfig;
    use crate::node::Node;

    fn node() -> Arc<Node> {
        Arc::new(Node::new(&NodeConfig::default(), Arc::new(fast_chain())))
    }

    macro_rules! app {
        ($node:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new(AppState { node: $node.clone() }))
                    .configure(init_routes),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn health_is_ok() {
        let node = node();
        let app = app!(node);
        let req = test::TestRequest::get().uri("/api/v1/health/").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn chain_dump_reports_every_block() {
        let node = node();
        let mined = extend(node.chain(), 2);
        let app = app!(node);

        let req = test::TestRequest::get().uri("/api/v1/chain/").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["node_address"], "127.0.0.1:3000");
        assert_eq!(body["length"], 3);
        assert_eq!(body["height"], 2);
        assert_eq!(body["latest_hash"], mined[1].hash());
        assert_eq!(body["blocks"][0]["index"], 0);
        assert_eq!(body["blocks"][0]["previous_hash"], "0");
        assert_eq!(body["blocks"][2]["hash"], mined[1].hash());
        assert_eq!(body["blocks"][1]["transactions"][0]["sender"], "Alice");
    }

    #[actix_web::test]
    async fn block_lookup_by_index() {
        let node = node();
        let mined = extend(node.chain(), 2);
        let app = app!(node);

        let req = test::TestRequest::get().uri("/api/v1/chain/2/").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["hash"], mined[1].hash());

        let req = test::TestRequest::get().uri("/api/v1/chain/7/").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn peers_are_listed() {
        let node = node();
        node.peers().add("10.0.0.2:3000");
        let app = app!(node);

        let req = test::TestRequest::get().uri("/api/v1/peers/").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["peers"][0], "10.0.0.2:3000");
    }

    #[actix_web::test]
    async fn sync_requires_an_address() {
        let node = node();
        let app = app!(node);

        let req = test::TestRequest::post()
            .uri("/api/v1/sync/")
            .set_json(serde_json::json!({ "address": "  " }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn sync_is_accepted_and_runs_in_background() {
        let node = node();
        let app = app!(node);

        let req = test::TestRequest::post()
            .uri("/api/v1/sync/")
            .set_json(serde_json::json!({ "address": "127.0.0.1:9" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
    }
}
