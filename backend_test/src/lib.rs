use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{parse_macro_input, spanned::Spanned, FnArg, Ident, ItemFn, Pat, Signature, Type};

/// Transform an asynchronous test into a synchronous one and inject
/// dependencies.
///
/// Injectable dependencies are [`rocket::local::asynchronous::Client`],
/// `crate::testing::Fixture` (the in-memory stores and ballot gate behind the
/// client), and `crate::model::identity::Identity` (the caller). The caller is
/// only available when the test is marked `#[backend_test(voter)]`, which
/// provides an enrolled voter, or `#[backend_test(admin)]`.
#[proc_macro_attribute]
pub fn backend_test(args: TokenStream, input: TokenStream) -> TokenStream {
    let mut item_fn = parse_macro_input!(input as ItemFn);
    let caller = parse_macro_input!(args as Option<Ident>);

    // Extract type information and reject invalid function signatures.
    let test_args = match check_sig(item_fn.sig.clone(), caller.is_some()) {
        Ok(args) => args,
        Err(err) => {
            return err.into_compile_error().into();
        }
    };

    // Rename the future so the test can have its original name.
    let name = item_fn.sig.ident.clone();
    let new_name = format_ident!("{}_fut", name);
    item_fn.sig.ident = new_name.clone();

    // Create the caller if needed.
    let make_caller = match caller {
        Some(arg) if arg == "voter" => quote! {
            #[allow(unused_variables)]
            let caller = fixture.enrolled_voter(crate::testing::VOTER_FACE).await;
        },
        Some(arg) if arg == "admin" => quote! {
            #[allow(unused_variables)]
            let caller = fixture.admin();
        },
        Some(arg) => {
            return syn::Error::new(arg.span(), "Expected `voter` or `admin`")
                .into_compile_error()
                .into();
        }
        None => quote! {},
    };

    // Rewrite the test function.
    quote! {
        #[test]
        fn #name() {
            /// Test setup.
            async fn setup() -> (rocket::local::asynchronous::Client, crate::testing::Fixture) {
                let fixture = crate::testing::Fixture::new();
                let rocket_client = rocket::local::asynchronous::Client::tracked(fixture.rocket())
                    .await
                    .unwrap();
                (rocket_client, fixture)
            }

            /// The test itself.
            #item_fn

            log4rs_test_utils::test_logging::init_logging_once_for(
                ["facevote_backend"],
                None,
                None,
            );

            // Face extraction runs on the blocking pool, so use a real
            // multi-threaded runtime like the server does.
            let runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("rocket-worker-test-thread")
                .worker_threads(2)
                .enable_all()
                .build()
                .unwrap();

            runtime.block_on(async {
                #[allow(unused_variables)]
                let (rocket_client, fixture) = setup().await;
                #make_caller
                #new_name(#(#test_args),*).await;
            });
        }
    }
    .into()
}

/// Ensure the wrapped test is async, extract parameters to inject, and reject unknown parameters.
fn check_sig(sig: Signature, has_caller: bool) -> Result<Vec<TokenStream2>, syn::Error> {
    if sig.asyncness.is_none() {
        return Err(syn::Error::new(sig.span(), "Test must be marked `async`"));
    }

    let mut has_client = false;
    let mut has_fixture = false;
    let mut has_identity = false;
    let mut args = vec![];

    for input in &sig.inputs {
        if let FnArg::Typed(pat_type) = input {
            if let Pat::Ident(_) = &*pat_type.pat {
                if let Type::Path(type_path) = &*pat_type.ty {
                    if let Some(type_ident) = type_path.path.get_ident() {
                        if type_ident == "Client" {
                            if has_client {
                                return Err(syn::Error::new(input.span(), "Test cannot accept more than one `rocket::local::asynchronous::Client`"));
                            }
                            has_client = true;
                            args.push(quote! { rocket_client });
                            continue;
                        } else if type_ident == "Fixture" {
                            if has_fixture {
                                return Err(syn::Error::new(
                                    input.span(),
                                    "Test cannot accept more than one `Fixture`",
                                ));
                            }
                            has_fixture = true;
                            args.push(quote! { fixture });
                            continue;
                        } else if type_ident == "Identity" {
                            if !has_caller {
                                return Err(syn::Error::new(
                                    input.span(),
                                    "An `Identity` needs `#[backend_test(voter)]` or `#[backend_test(admin)]`",
                                ));
                            }
                            if has_identity {
                                return Err(syn::Error::new(
                                    input.span(),
                                    "Test cannot accept more than one `Identity`",
                                ));
                            }
                            has_identity = true;
                            args.push(quote! { caller });
                            continue;
                        }
                    }
                }
            }
        }

        return Err(syn::Error::new(
            input.span(),
            "Expected one of `client_ident: Client`, `fixture_ident: Fixture` or `caller_ident: Identity`",
        ));
    }

    Ok(args)
}
