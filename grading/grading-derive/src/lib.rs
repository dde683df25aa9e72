use proc_macro::TokenStream;
use quote::quote_spanned;
use syn::{ItemFn, LitInt, parse_macro_input, spanned::Spanned};

#[proc_macro_attribute]
pub fn assert_exit_code(attr: TokenStream, item: TokenStream) -> TokenStream {
    let code = parse_macro_input!(attr as LitInt);
    let mut input_fn = parse_macro_input!(item as ItemFn);
    let block = *input_fn.block;
    *input_fn.block = syn::parse_quote! {
        {
            fn _f() {}
            fn _get_name<T>(_: T) -> &'static str {
                let n = core::any::type_name::<T>();
                &n[..n.len() - 4]
            }
            assert_eq!(
                tickos::thread::ThreadBuilder::new(_get_name(_f))
                    .spawn(move || { #block })
                    .join(),
            #code);
        }
    };
    TokenStream::from(quote_spanned! { input_fn.span() =>
        #input_fn
    })
}

#[proc_macro_attribute]
pub fn priority(attr: TokenStream, item: TokenStream) -> TokenStream {
    let priority = parse_macro_input!(attr as LitInt);
    let mut input_fn = parse_macro_input!(item as ItemFn);
    let block = *input_fn.block;
    *input_fn.block = syn::parse_quote! {
        {
            fn _f() {}
            fn _get_name<T>(_: T) -> &'static str {
                let n = core::any::type_name::<T>();
                &n[..n.len() - 4]
            }
            assert_eq!(
                tickos::thread::ThreadBuilder::new(_get_name(_f))
                    .priority(#priority)
                    .spawn(move || { #block })
                    .join(),
            0);
        }
    };
    TokenStream::from(quote_spanned! { input_fn.span() =>
        #input_fn
    })
}

#[proc_macro_attribute]
pub fn timeout_ticks(attr: TokenStream, item: TokenStream) -> TokenStream {
    let ticks = parse_macro_input!(attr as LitInt);
    let mut input_fn = parse_macro_input!(item as ItemFn);
    let block = *input_fn.block;
    *input_fn.block = syn::parse_quote! {
        {
            let _start = tickos::timer::ticks();
            let _return_val = (move || { #block })();
            let _elapsed = tickos::timer::elapsed(_start);
            assert!(
                _elapsed <= #ticks,
                "Took {} ticks, more than {} ticks.",
                _elapsed,
                #ticks
            );
            _return_val
        }
    };
    TokenStream::from(quote_spanned! { input_fn.span() =>
        #input_fn
    })
}
