use std::collections::BTreeMap;

use tracing::debug;

use crate::event::DockerfileReference;

/// Only images pulled from the public Docker hub are eligible for replacement.
pub const PUBLIC_HUB_HOST: &str = "hub.docker.com";

/// Closed lookup table from a bare base image name to its Chainguard
/// distroless replacement. Extend here, nothing else needs to change.
pub fn replacement_for(base_image: &str) -> Option<&'static str> {
    match base_image {
        "alpine" => Some("cgr.dev/chainguard/alpine-base"),
        "busybox" => Some("cgr.dev/chainguard/busybox"),
        "golang" => Some("cgr.dev/chainguard/go"),
        "nginx" => Some("cgr.dev/chainguard/nginx"),
        _ => None,
    }
}

/// Builds the replacement set for one event, keyed by the first token of the
/// raw `FROM` line arguments (e.g. `"alpine:3.11"`). References from other
/// registries or without a known replacement end up in the unmatched list.
pub fn build_replacement_set(froms: &[DockerfileReference]) -> (BTreeMap<String, String>, Vec<String>) {
    let mut replacements = BTreeMap::new();
    let mut unmatched = Vec::new();

    for dockerfile_from in froms {
        let image = &dockerfile_from.repository.name;

        let replacement = if dockerfile_from.repository.host == PUBLIC_HUB_HOST {
            replacement_for(image)
        } else {
            debug!(host = %dockerfile_from.repository.host, %image, "skipping image from unsupported registry");
            None
        };

        let Some(replacement) = replacement else {
            if !unmatched.contains(image) {
                unmatched.push(image.clone());
            }
            continue;
        };

        let key = dockerfile_from
            .dockerfile_line_args_string
            .split_whitespace()
            .next()
            .unwrap_or(image.as_str());
        replacements.insert(key.to_string(), replacement.to_string());
    }

    (replacements, unmatched)
}
