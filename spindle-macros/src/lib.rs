//! Attribute macros running a function body as a task.
//!
//! - `#[spindle::main]` turns `fn main` into a function that builds a task
//!   processor and blocks on the original body,
//! - `#[spindle::test]` does the same for a `#[test]` function.
//!
//! Both accept `worker_threads = N`, `stack_size = N` and `name = "..."`.

mod utils;

use proc_macro::{Delimiter, Group, TokenStream, TokenTree};

use utils::Settings;

#[proc_macro_attribute]
pub fn main(attr: TokenStream, item: TokenStream) -> TokenStream {
    expand(attr, item, "main", false)
}

#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
    expand(attr, item, "test", true)
}

fn expand(attr: TokenStream, item: TokenStream, default_name: &str, is_test: bool) -> TokenStream {
    let settings = match Settings::parse(attr) {
        Ok(settings) => settings,
        Err(msg) => return utils::compile_error(&msg),
    };

    let mut tokens: Vec<TokenTree> = item.into_iter().collect();

    let Some(pos) = tokens
        .iter()
        .rposition(|t| matches!(t, TokenTree::Group(g) if g.delimiter() == Delimiter::Brace))
    else {
        return utils::compile_error("expected a function body");
    };

    let block = match &tokens[pos] {
        TokenTree::Group(g) => g.stream().to_string(),
        _ => unreachable!(),
    };

    let new_block = format!(
        "{{
            let processor = {};
            processor.block_on(move || {{ {} }})
        }}",
        settings.builder(default_name),
        block
    );

    let body = match new_block.parse() {
        Ok(body) => body,
        Err(err) => return utils::compile_error(&format!("spindle macro error: {err}")),
    };
    tokens[pos] = TokenTree::Group(Group::new(Delimiter::Brace, body));

    let mut result: Vec<TokenTree> = Vec::new();
    if is_test {
        result.extend("#[test]".parse::<TokenStream>().unwrap_or_default());
    }
    result.extend(tokens);

    result.into_iter().collect()
}
