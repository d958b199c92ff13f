//! Thin server-rendered views. The dashboard under `/app` is the rich UI.

use super::{blocking, ApiResult};
use crate::model::{Patient, PatientStatus, Tier, WindowSummary};
use crate::orchestrator::Console;
use axum::{extract::State, response::Html};
use std::fmt::Write;

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

fn layout(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!doctype html>\n<html><head><meta charset=\"utf-8\"><title>{title} · Veil</title></head>\n\
         <body>\n<nav><a href=\"/\">Systems</a> | <a href=\"/organs\">Organs</a> | \
         <a href=\"/patients\">Patients</a> | <a href=\"/discharged\">Discharged</a> | \
         <a href=\"/status\">Status</a></nav>\n<h1>{title}</h1>\n{body}</body></html>\n"
    ))
}

pub(super) async fn systems(State(console): State<Console>) -> ApiResult<Html<String>> {
    let o = blocking(move || Ok(console.overview())).await?;
    let body = format!(
        "<ul>\n<li>Organs configured: {}</li>\n<li>Organs running: {}</li>\n\
         <li>Organs runnable: {}</li>\n<li>Patients: {} ({} active, {} discharged, {} restored)</li>\n</ul>\n",
        o.organs_total,
        o.organs_running,
        o.organs_runnable,
        o.patients.total,
        o.patients.active,
        o.patients.discharged,
        o.patients.restored,
    );
    Ok(layout("Systems", &body))
}

fn patient_table(patients: &[Patient]) -> String {
    if patients.is_empty() {
        return "<p>No patients.</p>\n".to_string();
    }
    let mut out = String::from("<table>\n<tr><th>ID</th><th>Name</th><th>DOB</th><th>Status</th></tr>\n");
    for p in patients {
        let _ = writeln!(
            out,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            p.id,
            escape(&p.name),
            escape(&p.date_of_birth),
            p.status
        );
    }
    out.push_str("</table>\n");
    out
}

pub(super) async fn patients(State(console): State<Console>) -> Html<String> {
    let mut current = console.patients.list(Some(PatientStatus::Active));
    current.extend(console.patients.list(Some(PatientStatus::Restored)));
    current.sort_by_key(|p| p.id);
    layout("Patients", &patient_table(&current))
}

pub(super) async fn discharged(State(console): State<Console>) -> Html<String> {
    let list = console.patients.list(Some(PatientStatus::Discharged));
    layout("Discharged", &patient_table(&list))
}

pub(super) async fn organs(State(console): State<Console>) -> ApiResult<Html<String>> {
    let registry = console.registry.clone();
    let listing = blocking(move || Ok(registry.list_organs())).await?;

    let mut body = format!(
        "<p>{} of {} organs running</p>\n",
        listing.running, listing.total
    );
    for tier in Tier::ALL {
        let rows: Vec<_> = listing.by_tier(tier).collect();
        if rows.is_empty() {
            continue;
        }
        let _ = writeln!(body, "<h2>{tier}</h2>\n<table>");
        for o in rows {
            let state = if o.running { "running" } else { "down" };
            let pid = o.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".into());
            let _ = writeln!(
                body,
                "<tr><td>{}</td><td>{}</td><td>{state}</td><td>{pid}</td></tr>",
                escape(&o.glyph),
                escape(&o.name),
            );
        }
        body.push_str("</table>\n");
    }
    Ok(layout("Organs", &body))
}

fn window_cell(w: Option<WindowSummary>) -> String {
    match w {
        Some(w) => format!(
            "mean {:.1}, median {:.1}, p25 {:.1}, p75 {:.1}",
            w.mean, w.median, w.p25, w.p75
        ),
        None => "-".to_string(),
    }
}

pub(super) async fn status(State(console): State<Console>) -> ApiResult<Html<String>> {
    let metrics = console.metrics.clone();
    let r = blocking(move || Ok(metrics.report())).await?;
    let body = format!(
        "<table>\n<tr><td>CPU</td><td>{:.1}%</td><td>{}</td></tr>\n\
         <tr><td>Memory</td><td>{:.1}%</td><td>{}</td></tr>\n\
         <tr><td>Load</td><td>{:.2} {:.2} {:.2}</td><td></td></tr>\n</table>\n\
         <p>{} samples</p>\n",
        r.cpu_percent,
        window_cell(r.cpu_window),
        r.mem_percent,
        window_cell(r.mem_window),
        r.load[0],
        r.load[1],
        r.load[2],
        r.samples,
    );
    Ok(layout("Status", &body))
}
