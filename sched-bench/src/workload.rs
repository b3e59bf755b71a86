// Copyright (c) Facebook, Inc. and its affiliates.
//
// Content-descriptor document generation. The player reads one XML document
// at startup describing the content set to schedule; each benchmark cycle
// rewrites it wholesale with the cycle's item count.
use anyhow::Result;
use log::info;
use std::fs;
use std::io::Write;

use super::Config;

const XML_HEADER: &str = "<?xml version=\"1.0\"?>";
const ROOT_OPEN: &str = "<content-set name=\"random files\" type=\"inline\">";
const ROOT_CLOSE: &str = "</content-set>";

// One inline content-set per image, keyed by its index. The player resolves
// the uri against pre-existing asset files, one distinct file per index.
pub fn leaf_xml(index: usize, images_dir: &str) -> String {
    format!(
        "<content-set name=\"random_image_{number}\" type=\"inline\">\
         <content-item content-type=\"image/jpeg\">\
         <requires-file>\
         <hashes/>\
         <sources>\
         <uri>file://{path}/random_image_{number}.jpeg</uri>\
         </sources>\
         </requires-file>\
         </content-item>\
         </content-set>",
        number = index,
        path = images_dir,
    )
}

// An empty group (nr_items == 0) is still a well-formed document.
pub fn generate(nr_items: usize, images_dir: &str) -> String {
    let mut inline = String::new();
    for i in 0..nr_items {
        inline.push_str(&leaf_xml(i, images_dir));
    }
    format!("{}\n{}{}{}", XML_HEADER, ROOT_OPEN, inline, ROOT_CLOSE)
}

pub fn write(cfg: &Config, nr_items: usize) -> Result<()> {
    info!(
        "workload: Writing {} item document to {:?}",
        nr_items, &cfg.workload_path
    );
    let doc = generate(nr_items, &cfg.images_dir);
    let mut f = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&cfg.workload_path)?;
    f.write_all(doc.as_ref())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document() {
        let doc = generate(0, "/tmp");
        assert!(doc.starts_with(XML_HEADER));
        assert!(doc.contains(format!("{}{}", ROOT_OPEN, ROOT_CLOSE).as_str()));
        assert_eq!(doc.matches("random_image_").count(), 0);
    }

    #[test]
    fn test_leaf_count_and_indices() {
        for &n in &[1usize, 5, 17] {
            let doc = generate(n, "/tmp");
            assert_eq!(doc.matches("<content-item").count(), n);
            for i in 0..n {
                let uri = format!("file:///tmp/random_image_{}.jpeg", i);
                assert_eq!(doc.matches(uri.as_str()).count(), 1);
            }
            // no leaf beyond the requested range
            let uri = format!("file:///tmp/random_image_{}.jpeg", n);
            assert_eq!(doc.matches(uri.as_str()).count(), 0);
        }
    }

    #[test]
    fn test_leaf_uri_uses_images_dir() {
        let leaf = leaf_xml(3, "/srv/assets");
        assert!(leaf.contains("<uri>file:///srv/assets/random_image_3.jpeg</uri>"));
        assert!(leaf.contains("name=\"random_image_3\""));
    }
}
