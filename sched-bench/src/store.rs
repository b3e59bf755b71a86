// Copyright (c) Facebook, Inc. and its affiliates.
//
// Context history store reseeding. The player consults a sqlite store of
// past playback contexts when ranking content; each benchmark cycle
// rebuilds it from scratch so every size starts from the same simulated
// usage history.
use anyhow::{Context, Result};
use log::{debug, info};
use rand::Rng;
use rusqlite::Connection;
use std::fs;
use std::io;

use super::{workload, BenchError, Config};
use sched_bench_intf::{CONTEXT_TABLE_NAME, CONTEXT_TYPE_PAGEVIEW};

lazy_static::lazy_static! {
    static ref CREATE_CONTEXT_TABLE: String = format!(
        "CREATE TABLE IF NOT EXISTS {table} (\
         context_id INTEGER PRIMARY KEY, \
         created DATETIME DEFAULT CURRENT_TIMESTAMP, \
         context_type TEXT, \
         content_item_xml TEXT)",
        table = CONTEXT_TABLE_NAME
    );
    static ref INSERT_CONTEXT_RECORD: String = format!(
        "INSERT INTO {table} (context_type, content_item_xml) VALUES (?1, ?2)",
        table = CONTEXT_TABLE_NAME
    );
}

// Missing file counts as already torn down. Anything else is fatal - a
// store we can't remove would leak history into the next cycle.
fn remove_store_file(path: &str) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!("store: Removed {:?}", path);
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(BenchError::StoreTeardown {
            path: path.to_string(),
            source: e,
        }
        .into()),
    }
}

pub fn reset(cfg: &Config, nr_items: usize) -> Result<()> {
    remove_store_file(&cfg.store_path)?;

    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .open(&cfg.store_path)
        .map_err(|e| BenchError::StoreTeardown {
            path: cfg.store_path.clone(),
            source: e,
        })?;

    let mut conn = Connection::open(&cfg.store_path)
        .with_context(|| format!("opening history store {:?}", &cfg.store_path))?;
    conn.execute_batch(&CREATE_CONTEXT_TABLE)?;

    // The same leaves the workload document carries, recomputed here so the
    // store never depends on the generated document's in-memory form.
    let items: Vec<String> = (0..nr_items)
        .map(|i| workload::leaf_xml(i, &cfg.images_dir))
        .collect();
    if items.is_empty() {
        return Err(BenchError::EmptyWorkload.into());
    }

    // All rows land in one transaction - a mid-batch failure rolls back
    // rather than leaving a short history for the player to read.
    let mut rng = rand::thread_rng();
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(&INSERT_CONTEXT_RECORD)?;
        for _ in 0..cfg.sample_count {
            let pick = &items[rng.gen_range(0..items.len())];
            stmt.execute(rusqlite::params![CONTEXT_TYPE_PAGEVIEW, pick])?;
        }
    }
    tx.commit()?;

    info!(
        "store: Seeded {} history rows drawn from {} items",
        cfg.sample_count, nr_items
    );
    Ok(())
}
