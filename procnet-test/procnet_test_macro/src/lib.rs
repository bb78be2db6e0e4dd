/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

use proc_macro::TokenStream;

use quote::quote;
use syn::punctuated::Punctuated;
use syn::{parse_macro_input, Expr, ExprLit, ItemFn, Lit, MetaNameValue, Token};

/// Seconds a test may run before the watchdog fails it.
const DEFAULT_TIMEOUT_SECS: u64 = 20;

/// Turns a function into a `#[test]` that runs under a watchdog.
///
/// ```rust,ignore
/// #[procnet_test(timeout = 5)]
/// fn pipeline_finishes() -> anyhow::Result<()> {
///     Ok(())
/// }
/// ```
#[proc_macro_attribute]
pub fn procnet_test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr with Punctuated::<MetaNameValue, Token![,]>::parse_terminated);
    let input = parse_macro_input!(item as ItemFn);

    let mut timeout = DEFAULT_TIMEOUT_SECS;
    for arg in &args {
        if !arg.path.is_ident("timeout") {
            return syn::Error::new_spanned(&arg.path, "expected `timeout = <seconds>`")
                .to_compile_error()
                .into();
        }
        match &arg.value {
            Expr::Lit(ExprLit {
                lit: Lit::Int(seconds),
                ..
            }) => match seconds.base10_parse::<u64>() {
                Ok(seconds) => timeout = seconds,
                Err(err) => return err.to_compile_error().into(),
            },
            other => {
                return syn::Error::new_spanned(other, "timeout must be an integer")
                    .to_compile_error()
                    .into()
            }
        }
    }

    let vis = &input.vis;
    let sig = &input.sig;
    let body = &input.block;
    let attrs = &input.attrs;
    let name = &sig.ident;
    let output = &sig.output;
    let inner_name = syn::Ident::new(&format!("__{name}_body"), name.span());

    let output = quote! {
        #[test]
        #(#attrs)*
        #vis fn #name() #output {
            ::procnet_test::initialize_tracing();
            ::procnet_test::run_with_watchdog(
                stringify!(#name),
                ::std::time::Duration::from_secs(#timeout),
                || {
                    let test_span = ::tracing::info_span!("procnet_test", name = stringify!(#name));
                    let _enter = test_span.enter();
                    #inner_name()
                },
            )
        }

        fn #inner_name() #output #body
    };

    output.into()
}
