use std::fmt::Write;

use actix_web::{HttpResponse, Responder, get, web};

use super::models::AppState;

/// Human-readable report of the block tree.
#[get("/status")]
pub async fn status_page(state: web::Data<AppState>) -> impl Responder {
    let node = &state.node;
    let chain = node.chain();
    let latest = chain.get_latest_block().hash();

    let mut rows = String::new();
    chain.traverse_tree(|entry| {
        let block = entry.block();
        let txs = block
            .transactions
            .iter()
            .map(|tx| {
                format!(
                    "{} &rarr; {}: {}",
                    escape(&String::from_utf8_lossy(&tx.sender)),
                    escape(&String::from_utf8_lossy(&tx.receiver)),
                    tx.amount
                )
            })
            .collect::<Vec<_>>()
            .join("<br>");
        let marker = if entry.hash() == latest { " class=\"latest\"" } else { "" };
        let _ = write!(
            rows,
            "<tr{marker}><td>{}</td><td><code>{}</code></td><td><code>{}</code></td>\
             <td>{}</td><td>{}</td><td>{}</td><td>{txs}</td></tr>",
            block.index,
            entry.hash(),
            escape(&block.previous_hash),
            block.nonce,
            if block.checkpoint { "yes" } else { "" },
            entry.children().len(),
        );
        false
    });

    let peers = node
        .peers()
        .all()
        .iter()
        .map(|p| format!("<li>{}</li>", escape(p)))
        .collect::<String>();

    let body = format!(
        "<!DOCTYPE html><html><head><title>Node {address}</title>\
         <style>tr.latest {{ font-weight: bold; }}</style></head><body>\
         <h1>Node {address}</h1>\
         <p>Blocks: {count} &middot; Height: {height} &middot; Latest: <code>{latest}</code></p>\
         <h2>Peers ({peer_count})</h2><ul>{peers}</ul>\
         <h2>Blocks</h2><table><tr><th>Index</th><th>Hash</th><th>Previous</th>\
         <th>Nonce</th><th>Checkpoint</th><th>Children</th><th>Transactions</th></tr>{rows}</table>\
         </body></html>",
        address = escape(node.address()),
        count = chain.len(),
        height = chain.height(),
        peer_count = node.peers().len(),
    );

    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(body)
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
