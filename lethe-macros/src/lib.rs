use proc_macro::TokenStream;
use quote::quote;
use syn::{parse::Parser, parse_macro_input, FnArg, ItemFn, Meta, ReturnType};

/// Procedural macro to run an async handler method through a Lethe dedup gate.
///
/// # Example
///
/// ```rust,ignore
/// #[deduplicate(gate = self.gate, id = message.id.clone())]
/// async fn record_link(&self, message: Message) -> Result<Effect, HandlerError> {
///     // Write the row...
///     Ok(Effect::Committed)
/// }
/// ```
///
/// This expands to a method returning `Result<lethe_rs::Outcome, lethe_rs::Error>`
/// whose body calls `gate.admit(id, |_| async move { ... })`.
///
/// # Requirements
///
/// - The function must be `async`
/// - The function must be declared as returning `Result<Effect, HandlerError>`
/// - The `gate` expression must evaluate to a `DedupGate` or something that derefs to one
/// - The `id` expression must evaluate to a type that implements `Into<EventId>`
#[proc_macro_attribute]
pub fn deduplicate(attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);

    let parser = syn::punctuated::Punctuated::<Meta, syn::Token![,]>::parse_terminated;
    let args = match parser.parse(attr) {
        Ok(args) => args,
        Err(e) => return e.to_compile_error().into(),
    };

    let mut gate_expr = None;
    let mut id_expr = None;

    for arg in args {
        match arg {
            Meta::NameValue(nv) => {
                let name = nv.path.get_ident().map(|i| i.to_string());
                match name.as_deref() {
                    Some("gate") => {
                        gate_expr = Some(nv.value);
                    }
                    Some("id") => {
                        id_expr = Some(nv.value);
                    }
                    _ => {
                        return syn::Error::new_spanned(
                            nv.path,
                            "Unknown attribute parameter. Expected 'gate' or 'id'",
                        )
                        .to_compile_error()
                        .into();
                    }
                }
            }
            _ => {
                return syn::Error::new_spanned(
                    arg,
                    "Expected name-value pair like `gate = self.gate` or `id = message.id`",
                )
                .to_compile_error()
                .into();
            }
        }
    }

    let Some(gate) = gate_expr else {
        return syn::Error::new(
            proc_macro2::Span::call_site(),
            "Missing required 'gate' parameter",
        )
        .to_compile_error()
        .into();
    };

    let Some(id) = id_expr else {
        return syn::Error::new(
            proc_macro2::Span::call_site(),
            "Missing required 'id' parameter",
        )
        .to_compile_error()
        .into();
    };

    if input.sig.asyncness.is_none() {
        return syn::Error::new_spanned(
            input.sig.fn_token,
            "The #[deduplicate] macro can only be applied to async functions",
        )
        .to_compile_error()
        .into();
    }

    if let ReturnType::Default = input.sig.output {
        return syn::Error::new_spanned(
            &input.sig,
            "Function must return Result<Effect, HandlerError>",
        )
        .to_compile_error()
        .into();
    }

    let fn_vis = &input.vis;
    let fn_name = &input.sig.ident;
    let fn_generics = &input.sig.generics;
    let fn_where = &input.sig.generics.where_clause;
    let fn_inputs = &input.sig.inputs;
    let fn_block = &input.block;
    let fn_attrs = &input.attrs;

    // Typed parameters are moved into the handler future
    let param_names: Vec<_> = fn_inputs
        .iter()
        .filter_map(|arg| {
            if let FnArg::Typed(pat_type) = arg {
                if let syn::Pat::Ident(pat_ident) = &*pat_type.pat {
                    return Some(&pat_ident.ident);
                }
            }
            None
        })
        .collect();

    let expanded = quote! {
        #(#fn_attrs)*
        #fn_vis async fn #fn_name #fn_generics(#fn_inputs)
            -> ::core::result::Result<::lethe_rs::Outcome, ::lethe_rs::Error>
            #fn_where
        {
            let __lethe_id = ::lethe_rs::EventId::from(#id);
            let __lethe_gate = &#gate;

            __lethe_gate
                .admit(__lethe_id, move |_| async move {
                    #(
                        #[allow(unused_variables)]
                        let #param_names = #param_names;
                    )*
                    let __lethe_result: ::core::result::Result<
                        ::lethe_rs::Effect,
                        ::lethe_rs::HandlerError,
                    > = #fn_block;
                    __lethe_result
                })
                .await
        }
    };

    TokenStream::from(expanded)
}
