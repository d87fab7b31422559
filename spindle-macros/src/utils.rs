use proc_macro::{TokenStream, TokenTree};

/// Splits a `TokenStream` into comma-separated arguments.
///
/// Each argument is returned as a `Vec<TokenTree>`.
/// Commas at the top level are used as separators.
pub(crate) fn split_args(input: TokenStream) -> Vec<Vec<TokenTree>> {
    let mut args = Vec::new();
    let mut current = Vec::new();

    for token in input {
        match &token {
            TokenTree::Punct(p) if p.as_char() == ',' => {
                if !current.is_empty() {
                    args.push(current);
                    current = Vec::new();
                }
            }
            _ => current.push(token),
        }
    }

    if !current.is_empty() {
        args.push(current);
    }

    args
}

/// Emits `compile_error!` with `msg`.
pub(crate) fn compile_error(msg: &str) -> TokenStream {
    format!("compile_error!({msg:?});")
        .parse()
        .unwrap_or_default()
}

/// Options accepted by the attribute macros.
#[derive(Default)]
pub(crate) struct Settings {
    worker_threads: Option<usize>,
    stack_size: Option<usize>,
    name: Option<String>,
}

impl Settings {
    /// Parses `key = value` pairs separated by commas.
    pub(crate) fn parse(attr: TokenStream) -> Result<Self, String> {
        let mut settings = Settings::default();

        for arg in split_args(attr) {
            let [TokenTree::Ident(key), TokenTree::Punct(eq), value] = arg.as_slice() else {
                return Err("expected `key = value`".to_owned());
            };
            if eq.as_char() != '=' {
                return Err(format!("expected `=` after `{key}`"));
            }

            let value = value.to_string();
            match key.to_string().as_str() {
                "worker_threads" => settings.worker_threads = Some(parse_usize(&value, "worker_threads")?),
                "stack_size" => settings.stack_size = Some(parse_usize(&value, "stack_size")?),
                "name" => settings.name = Some(value.trim_matches('"').to_owned()),
                other => return Err(format!("unknown option `{other}`")),
            }
        }

        Ok(settings)
    }

    /// Source of the expression building the task processor.
    pub(crate) fn builder(&self, default_name: &str) -> String {
        let name = self.name.as_deref().unwrap_or(default_name);
        let mut builder = format!("::spindle::TaskProcessorBuilder::new().name({name:?})");

        if let Some(n) = self.worker_threads {
            builder.push_str(&format!(".worker_threads({n})"));
        }
        if let Some(n) = self.stack_size {
            builder.push_str(&format!(".stack_size({n})"));
        }

        builder.push_str(".build()");
        builder
    }
}

fn parse_usize(value: &str, key: &str) -> Result<usize, String> {
    value
        .replace('_', "")
        .parse()
        .map_err(|_| format!("`{key}` expects an integer, got `{value}`"))
}
