//! Input checks shared by the public client operations

use regex::Regex;
use std::sync::LazyLock;

static VALID_INPUT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w\-:/.]*$").expect("input pattern"));

static VALID_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(http|https)://(\w+:{0,1}\w*@)?(\S+)(:[0-9]+)?(/|/([\w#!:.?+=&%@!\-/]))?\s*$",
    )
    .expect("url pattern")
});

/// Keys, tokens and channel names may only hold word characters, `-`, `:`, `/` and `.`
pub fn is_valid_input(input: &str) -> bool {
    VALID_INPUT.is_match(input)
}

pub fn is_valid_url(url: &str) -> bool {
    VALID_URL.is_match(url)
}
