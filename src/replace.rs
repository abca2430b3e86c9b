use anyhow::Context;
use regex::{NoExpand, Regex};

/// Rewrites every `FROM <base_image>[:<tag>][ <alias...>]` line in a
/// Dockerfile to `FROM <new_base_image>`, dropping the tag and any trailing
/// tokens. Matches are anchored at the start of a line, case-sensitive, and
/// the image name cannot extend into a longer name (`alpine` does not match
/// `alpine-base`). Multi-line or continuation `FROM` syntax is not handled.
///
/// Idempotent for a single mapping. Known limitation: if a replacement
/// reference coincidentally equals another mapping's source image, a later
/// pass can rewrite it again.
pub fn replace_base_image(content: &str, base_image: &str, new_base_image: &str) -> Result<String, anyhow::Error> {
    let pattern = format!(r"(?m)^FROM {}(?::\S*)?(?:[ \t].*)?$", regex::escape(base_image));
    let re = Regex::new(&pattern).with_context(|| format!("cannot compile FROM pattern for {base_image:?}"))?;

    let replacement = format!("FROM {new_base_image}");
    Ok(re.replace_all(content, NoExpand(&replacement)).into_owned())
}
