//! `#[tokio_timeout_test]` and `#[timeout]`: test attributes with a wall-clock limit.
//!
//! The test body runs on its own thread; the harness thread gives up after the limit and
//! fails the test, so a protocol that never answers cannot wedge the whole run.
//!
//! Both attributes accept `N`, `secs = N` and (async only) `flavor = "multi_thread"`:
//!
//! ```ignore
//! #[test_timeout::tokio_timeout_test(10, flavor = "multi_thread")]
//! async fn concurrent_calls() { /* .. */ }
//! ```

use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::quote;
use syn::parse::{Parse, ParseStream};
use syn::{parse_macro_input, Attribute, Ident, ItemFn, LitInt, LitStr, Token};

const DEFAULT_SECS: u64 = 30;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Flavor {
    CurrentThread,
    MultiThread,
}

struct TimeoutArgs {
    secs: u64,
    flavor: Option<(Flavor, Span)>,
}

impl Parse for TimeoutArgs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut args = TimeoutArgs {
            secs: DEFAULT_SECS,
            flavor: None,
        };
        while !input.is_empty() {
            if input.peek(LitInt) {
                args.secs = parse_secs(&input.parse()?)?;
            } else {
                let key: Ident = input.parse()?;
                input.parse::<Token![=]>()?;
                match key.to_string().as_str() {
                    "secs" => args.secs = parse_secs(&input.parse()?)?,
                    "flavor" => {
                        let lit: LitStr = input.parse()?;
                        let flavor = match lit.value().as_str() {
                            "current_thread" => Flavor::CurrentThread,
                            "multi_thread" => Flavor::MultiThread,
                            other => {
                                return Err(syn::Error::new(
                                    lit.span(),
                                    format!("unknown runtime flavor `{other}`"),
                                ))
                            }
                        };
                        args.flavor = Some((flavor, lit.span()));
                    }
                    _ => return Err(syn::Error::new(key.span(), "expected `secs` or `flavor`")),
                }
            }
            if input.is_empty() {
                break;
            }
            input.parse::<Token![,]>()?;
        }
        Ok(args)
    }
}

fn parse_secs(lit: &LitInt) -> syn::Result<u64> {
    let secs: u64 = lit.base10_parse()?;
    if secs == 0 {
        return Err(syn::Error::new(lit.span(), "timeout must be greater than zero"));
    }
    Ok(secs)
}

/// Async test on a fresh tokio runtime, failed after the limit.
#[proc_macro_attribute]
pub fn tokio_timeout_test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr as TimeoutArgs);
    let ItemFn {
        attrs,
        vis,
        mut sig,
        block,
    } = parse_macro_input!(item as ItemFn);

    if sig.asyncness.take().is_none() {
        return syn::Error::new_spanned(&sig.ident, "tokio_timeout_test expects an async fn")
            .to_compile_error()
            .into();
    }

    let runtime = match args.flavor.map(|(flavor, _)| flavor) {
        Some(Flavor::MultiThread) => quote! {
            tokio::runtime::Builder::new_multi_thread().worker_threads(2)
        },
        _ => quote! { tokio::runtime::Builder::new_current_thread() },
    };
    let secs = args.secs;
    let body = quote! {
        let runtime = #runtime
            .enable_all()
            .build()
            .expect("failed to build tokio runtime");
        runtime.block_on(async {
            tokio::time::timeout(std::time::Duration::from_secs(#secs), async move #block)
                .await
                .expect("test timed out");
        });
    };

    expand(filter_attrs(attrs, "tokio"), vis, sig, secs, body)
}

/// Synchronous test, failed after the limit.
#[proc_macro_attribute]
pub fn timeout(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr as TimeoutArgs);
    if let Some((_, span)) = args.flavor {
        return syn::Error::new(span, "`flavor` only applies to tokio_timeout_test")
            .to_compile_error()
            .into();
    }
    let ItemFn {
        attrs,
        vis,
        sig,
        block,
    } = parse_macro_input!(item as ItemFn);

    if sig.asyncness.is_some() {
        return syn::Error::new_spanned(&sig.ident, "use tokio_timeout_test for async tests")
            .to_compile_error()
            .into();
    }

    let body = quote! { #block; };
    expand(filter_attrs(attrs, "test"), vis, sig, args.secs, body)
}

fn expand(
    attrs: Vec<Attribute>,
    vis: syn::Visibility,
    sig: syn::Signature,
    secs: u64,
    body: TokenStream2,
) -> TokenStream {
    TokenStream::from(quote! {
        #[test]
        #(#attrs)*
        #vis #sig {
            let limit = std::time::Duration::from_secs(#secs);
            let (done_tx, done_rx) = std::sync::mpsc::channel();
            std::thread::spawn(move || {
                let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| { #body }));
                let _ = done_tx.send(outcome);
            });
            match done_rx.recv_timeout(limit) {
                Ok(Ok(())) => {}
                Ok(Err(payload)) => std::panic::resume_unwind(payload),
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                    panic!("test exceeded {}s", #secs)
                }
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                    panic!("test thread exited without reporting")
                }
            }
        }
    })
}

/// Drops a stray `#[test]` or `#[tokio::test]` so the test is not registered twice.
fn filter_attrs(attrs: Vec<Attribute>, kind: &str) -> Vec<Attribute> {
    attrs
        .into_iter()
        .filter(|attr| {
            let path: Vec<String> = attr
                .path()
                .segments
                .iter()
                .map(|segment| segment.ident.to_string())
                .collect();
            match kind {
                "tokio" => path != ["tokio", "test"],
                _ => path != ["test"],
            }
        })
        .collect()
}
