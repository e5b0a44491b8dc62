use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

mod support;

use rpcsec::auth::{AuthGss, ContextState, SecurityFlavor, Service};
use rpcsec::config::{ClientConfig, SecurityConfig};
use rpcsec::error::{Error, Result};
use rpcsec::rpc::RpcClient;
use rpcsec::xdr;
use rpcsec::xdr::rpc::{auth_error_reply, auth_stat};

use support::{split_reply, splice_verifier, Faults, GssServer, MockProvider, HANDLE, WINDOW};

const PROGRAM: u32 = 100003;
const VERSION: u32 = 4;
const PROC_ECHO: u32 = 1;

fn gss(service: Service) -> Arc<AuthGss<MockProvider>> {
    gss_with(MockProvider::default(), service)
}

fn gss_with(provider: MockProvider, service: Service) -> Arc<AuthGss<MockProvider>> {
    Arc::new(AuthGss::new(provider, "nfs@server.example.com", service).expect("import name"))
}

fn client(security: &Arc<AuthGss<MockProvider>>) -> RpcClient {
    RpcClient::new(PROGRAM, VERSION, security.clone())
}

#[test]
fn negotiation_walks_through_every_state() {
    support::init_logging();
    let server = GssServer::default();
    let security = gss(Service::Integrity);
    let client = client(&security);
    assert_eq!(security.state(), ContextState::Uninitialized);
    assert!(security.needs_handshake());

    let states = Mutex::new(Vec::new());
    let mut transport = |call: &[u8]| -> Result<Vec<u8>> {
        states.lock().unwrap().push(security.state());
        server.handle(call)
    };
    client.establish(&mut transport).expect("establish");

    assert_eq!(*states.lock().unwrap(), vec![ContextState::Negotiating]);
    assert_eq!(security.state(), ContextState::Established);
    assert_eq!(security.window(), WINDOW);
    assert_eq!(security.handle(), HANDLE);
    assert_eq!(security.sequence(), 0);
    assert!(!security.needs_handshake());
}

#[test]
fn negotiation_may_take_several_rounds() {
    let server = GssServer::new(2);
    let security = gss_with(MockProvider { rounds: 2 }, Service::None);
    let client = client(&security);

    client.establish(&mut server.transport()).expect("establish");
    assert_eq!(security.state(), ContextState::Established);
    assert_eq!(client.call(&mut server.transport(), PROC_ECHO, b"ping").unwrap(), b"ping");
}

#[test]
fn integrity_calls_are_numbered_from_one() {
    support::init_logging();
    let server = GssServer::default();
    let security = gss(Service::Integrity);
    let client = client(&security);

    // The first call establishes the context.
    let payloads: [&[u8]; 3] = [b"first", b"second call", b"3"];
    for (i, payload) in payloads.iter().enumerate() {
        let results = client.call(&mut server.transport(), PROC_ECHO, payload).unwrap();
        assert_eq!(results, *payload);
        assert_eq!(security.sequence(), i as u32 + 1);
    }
    assert_eq!(server.sequences(), vec![1, 2, 3]);
}

#[test]
fn corrupted_checksum_fails_only_its_call() {
    let server = GssServer::default();
    let security = gss(Service::Integrity);
    let client = client(&security);
    client.establish(&mut server.transport()).unwrap();
    server.set_faults(Faults { corrupt_checksum_seq: Some(2), ..Faults::default() });

    let outcomes: Vec<_> =
        (0..3).map(|_| client.call(&mut server.transport(), PROC_ECHO, b"payload")).collect();

    assert_eq!(outcomes[0].as_deref().unwrap(), b"payload");
    assert!(matches!(outcomes[1], Err(Error::IntegrityCheckFailed)));
    assert_eq!(outcomes[2].as_deref().unwrap(), b"payload");
    assert_eq!(security.state(), ContextState::Established);
}

#[test]
fn any_flipped_bit_in_protected_results_is_detected() {
    let server = GssServer::default();
    let security = gss(Service::Integrity);
    let client = client(&security);
    client.establish(&mut server.transport()).unwrap();

    let call = client.prepare_call(PROC_ECHO, b"hello").unwrap();
    let reply = server.handle(call.body()).unwrap();
    let (_, results) = split_reply(&reply);
    let start = reply.len() - results.len();

    for byte in start..reply.len() {
        for bit in 0..8 {
            let mut tampered = reply.clone();
            tampered[byte] ^= 1 << bit;
            assert!(
                client.process_reply(&call, &tampered).is_err(),
                "flip of bit {bit} in byte {byte} went unnoticed"
            );
        }
    }

    assert_eq!(client.process_reply(&call, &reply).unwrap(), b"hello");
    assert_eq!(security.state(), ContextState::Established);
}

#[test]
fn reply_verifier_of_another_call_is_rejected() {
    let server = GssServer::default();
    let security = gss(Service::None);
    let client = client(&security);
    client.establish(&mut server.transport()).unwrap();

    let first = client.prepare_call(PROC_ECHO, b"one").unwrap();
    let second = client.prepare_call(PROC_ECHO, b"two").unwrap();
    let first_reply = server.handle(first.body()).unwrap();
    let second_reply = server.handle(second.body()).unwrap();

    let (captured, _) = split_reply(&first_reply);
    let replayed = splice_verifier(&second_reply, captured);
    assert!(matches!(client.process_reply(&second, &replayed), Err(Error::BadReplyVerifier)));

    assert_eq!(client.process_reply(&second, &second_reply).unwrap(), b"two");
    assert_eq!(security.state(), ContextState::Established);
}

#[test]
fn privacy_hides_and_restores_the_payload() {
    let server = GssServer::default();
    let security = gss(Service::Privacy);
    let client = client(&security);
    client.establish(&mut server.transport()).unwrap();

    let payload = b"top secret payload";
    let call = client.prepare_call(PROC_ECHO, payload).unwrap();
    assert!(!call.body().windows(payload.len()).any(|w| w == payload));

    let reply = server.handle(call.body()).unwrap();
    assert!(!reply.windows(payload.len()).any(|w| w == payload));
    assert_eq!(client.process_reply(&call, &reply).unwrap(), payload);
}

#[test]
fn results_bound_to_another_sequence_are_rejected() {
    let server = GssServer::default();
    let security = gss(Service::Privacy);
    let client = client(&security);
    client.establish(&mut server.transport()).unwrap();

    server.set_faults(Faults { result_seq_offset: 1, ..Faults::default() });
    assert!(matches!(
        client.call(&mut server.transport(), PROC_ECHO, b"data"),
        Err(Error::SequenceMismatch { expected: 1, got: 2 })
    ));

    // Fatal for that call only.
    server.set_faults(Faults::default());
    assert_eq!(client.call(&mut server.transport(), PROC_ECHO, b"data").unwrap(), b"data");
    assert_eq!(security.sequence(), 2);
}

#[test]
fn service_can_change_between_calls() {
    let server = GssServer::default();
    let security = gss(Service::None);
    let client = client(&security);

    for service in [Service::Integrity, Service::Privacy, Service::None] {
        security.set_service(service);
        assert_eq!(client.call(&mut server.transport(), PROC_ECHO, b"abc").unwrap(), b"abc");
    }
}

#[test]
fn server_completing_early_is_a_protocol_violation() {
    let server = GssServer::new(1);
    let security = gss_with(MockProvider { rounds: 2 }, Service::None);
    let client = client(&security);

    assert!(matches!(client.establish(&mut server.transport()), Err(Error::UnexpectedComplete)));
    assert_eq!(security.state(), ContextState::Uninitialized);

    // No automatic rebuild.
    assert!(matches!(
        client.call(&mut server.transport(), PROC_ECHO, b"x"),
        Err(Error::NotEstablished)
    ));
}

#[test]
fn client_completing_early_is_a_context_problem() {
    // The client completes on the first server token, the server wants three rounds.
    let server = GssServer::new(3);
    let security = gss(Service::None);
    let client = client(&security);

    assert!(matches!(client.establish(&mut server.transport()), Err(Error::ContextProblem)));
    assert_eq!(security.state(), ContextState::Uninitialized);
}

#[test]
fn init_reply_must_be_signed_over_the_window() {
    let server = GssServer::default();
    server.set_faults(Faults { bad_init_verifier: true, ..Faults::default() });
    let security = gss(Service::None);
    let client = client(&security);

    assert!(matches!(client.establish(&mut server.transport()), Err(Error::BadReplyVerifier)));
    assert_eq!(security.state(), ContextState::Uninitialized);
}

#[test]
fn context_problem_tears_the_context_down() {
    support::init_logging();
    let server = GssServer::default();
    let security = gss(Service::Integrity);
    let client = client(&security);
    client.call(&mut server.transport(), PROC_ECHO, b"ok").unwrap();

    server.set_faults(Faults { context_problem: true, ..Faults::default() });
    let err = client.call(&mut server.transport(), PROC_ECHO, b"ok").unwrap_err();
    assert!(matches!(err, Error::ContextProblem));
    assert!(err.is_auth_rejection());
    assert_eq!(security.state(), ContextState::Uninitialized);
    assert!(matches!(
        client.call(&mut server.transport(), PROC_ECHO, b"ok"),
        Err(Error::NotEstablished)
    ));

    // Rebuilding is the caller's decision.
    server.set_faults(Faults::default());
    client.establish(&mut server.transport()).unwrap();
    assert_eq!(client.call(&mut server.transport(), PROC_ECHO, b"ok").unwrap(), b"ok");
    assert_eq!(security.sequence(), 1);
}

#[test]
fn replayed_call_gets_no_usable_reply() {
    let server = GssServer::default();
    let security = gss(Service::Integrity);
    let client = client(&security);
    client.establish(&mut server.transport()).unwrap();

    let call = client.prepare_call(PROC_ECHO, b"once").unwrap();
    let reply = server.handle(call.body()).unwrap();
    assert_eq!(client.process_reply(&call, &reply).unwrap(), b"once");

    let err = server.handle(call.body()).unwrap_err();
    assert!(err.is_auth_rejection());
}

#[test]
fn sequence_numbers_are_not_reused_after_failures() {
    let server = GssServer::default();
    let security = gss(Service::Integrity);
    let client = client(&security);
    client.establish(&mut server.transport()).unwrap();

    let mut delivered = 0;
    let mut lossy = |call: &[u8]| -> Result<Vec<u8>> {
        delivered += 1;
        if delivered % 2 == 0 {
            return Err(Error::NoReply);
        }
        server.handle(call)
    };
    for _ in 0..6 {
        let _ = client.call(&mut lossy, PROC_ECHO, b"maybe");
    }
    assert_eq!(security.sequence(), 6);
    assert_eq!(server.sequences(), vec![1, 3, 5]);

    let seqs: Vec<_> =
        (0..3).map(|_| client.prepare_call(PROC_ECHO, b"").unwrap().seq().unwrap()).collect();
    assert_eq!(seqs, vec![7, 8, 9]);
}

#[test]
fn concurrent_calls_get_distinct_sequence_numbers() {
    const THREADS: u32 = 8;
    const CALLS: u32 = 25;

    let server = GssServer::default();
    let security = gss(Service::Integrity);
    let client = client(&security);
    client.establish(&mut server.transport()).unwrap();

    thread::scope(|scope| {
        for thread in 0..THREADS {
            let client = &client;
            let server = &server;
            scope.spawn(move || {
                let mut transport = server.transport();
                for call in 0..CALLS {
                    let payload = format!("{thread}:{call}").into_bytes();
                    let results = client.call(&mut transport, PROC_ECHO, &payload).unwrap();
                    assert_eq!(results, payload);
                }
            });
        }
    });

    assert_eq!(server.sequences(), (1..=THREADS * CALLS).collect::<Vec<_>>());
    assert_eq!(security.sequence(), THREADS * CALLS);
}

#[test]
fn data_calls_are_refused_while_negotiating() {
    let security = gss(Service::Privacy);
    let client = client(&security);
    assert!(security.handshake_token().unwrap().is_some());
    assert_eq!(security.state(), ContextState::Negotiating);

    assert!(matches!(
        client.prepare_call(PROC_ECHO, b"top secret payload"),
        Err(Error::NotEstablished)
    ));
    assert!(matches!(security.make_credential(), Err(Error::NotEstablished)));
    assert_eq!(security.state(), ContextState::Negotiating);
    assert_eq!(security.sequence(), 0);
}

#[test]
fn concurrent_first_use_negotiates_once() {
    const THREADS: u32 = 6;
    const SECRET: &[u8] = b"secret payload";

    support::init_logging();
    let server = GssServer::default();
    let security = gss(Service::Privacy);
    let client = client(&security);
    let start = Barrier::new(THREADS as usize);

    thread::scope(|scope| {
        for id in 0..THREADS {
            let (client, server, security, start) = (&client, &server, &security, &start);
            scope.spawn(move || {
                let mut transport = |call: &[u8]| -> Result<Vec<u8>> {
                    assert!(!call.windows(SECRET.len()).any(|w| w == SECRET), "cleartext sent");
                    if security.state() != ContextState::Established {
                        // Keep negotiation open long enough for the others to arrive.
                        thread::sleep(Duration::from_millis(50));
                    }
                    server.handle(call)
                };
                let payload = [SECRET, format!(" {id}").as_bytes()].concat();
                start.wait();
                assert_eq!(client.call(&mut transport, PROC_ECHO, &payload).unwrap(), payload);
            });
        }
    });

    assert_eq!(server.context_creations(), 1);
    assert_eq!(server.sequences(), (1..=THREADS).collect::<Vec<_>>());
    assert_eq!(security.state(), ContextState::Established);
}

#[test]
fn failure_of_a_replaced_context_keeps_the_current_one() {
    let server = GssServer::default();
    let security = gss(Service::Integrity);
    let client = client(&security);
    client.establish(&mut server.transport()).unwrap();
    let stale = client.prepare_call(PROC_ECHO, b"late").unwrap();

    client.destroy(&mut server.transport()).unwrap();
    client.establish(&mut server.transport()).unwrap();

    let reply = xdr::to_bytes(&auth_error_reply(stale.xid(), auth_stat::RPCSEC_GSS_CTXPROBLEM))
        .unwrap();
    assert!(matches!(client.process_reply(&stale, &reply), Err(Error::ContextProblem)));
    assert_eq!(security.state(), ContextState::Established);
    assert_eq!(client.call(&mut server.transport(), PROC_ECHO, b"fresh").unwrap(), b"fresh");
}

#[test]
fn stale_failures_race_with_current_traffic() {
    const STALE: usize = 4;
    const WORKERS: u32 = 4;
    const CALLS: u32 = 10;

    let server = GssServer::default();
    let security = gss(Service::Integrity);
    let client = client(&security);
    client.establish(&mut server.transport()).unwrap();
    let stale: Vec<_> =
        (0..STALE).map(|_| client.prepare_call(PROC_ECHO, b"old").unwrap()).collect();

    client.destroy(&mut server.transport()).unwrap();
    client.establish(&mut server.transport()).unwrap();

    thread::scope(|scope| {
        for call in &stale {
            let client = &client;
            scope.spawn(move || {
                let reply = auth_error_reply(call.xid(), auth_stat::AUTH_REJECTEDCRED);
                let reply = xdr::to_bytes(&reply).unwrap();
                assert!(matches!(
                    client.process_reply(call, &reply),
                    Err(Error::BadCredential(auth_stat::AUTH_REJECTEDCRED))
                ));
            });
        }
        for _ in 0..WORKERS {
            let (client, server) = (&client, &server);
            scope.spawn(move || {
                let mut transport = server.transport();
                for _ in 0..CALLS {
                    assert_eq!(client.call(&mut transport, PROC_ECHO, b"new").unwrap(), b"new");
                }
            });
        }
    });

    assert_eq!(security.state(), ContextState::Established);
    assert_eq!(server.sequences(), (1..=WORKERS * CALLS).collect::<Vec<_>>());
}

#[test]
fn destroy_tears_down_both_ends() {
    let server = GssServer::default();
    let security = gss(Service::Integrity);
    let client = client(&security);
    client.call(&mut server.transport(), PROC_ECHO, b"before").unwrap();

    client.destroy(&mut server.transport()).expect("destroy");
    assert!(server.is_destroyed());
    assert_eq!(server.sequences(), vec![1, 2]);
    assert_eq!(security.state(), ContextState::Uninitialized);
    assert!(matches!(
        client.call(&mut server.transport(), PROC_ECHO, b"after"),
        Err(Error::NotEstablished)
    ));

    // Nothing left to destroy.
    client.destroy(&mut server.transport()).unwrap();
}

#[test]
fn data_credentials_need_an_established_context() {
    let security = gss(Service::None);
    assert!(matches!(security.make_credential(), Err(Error::NotEstablished)));
    assert!(matches!(
        AuthGss::new(MockProvider::default(), "no-host", Service::None),
        Err(Error::Provider(_))
    ));
}

#[test]
fn config_selects_rpcsec_gss() {
    let server = GssServer::default();
    let config = ClientConfig {
        program: PROGRAM,
        version: VERSION,
        security: "krb5i".parse::<SecurityConfig>().unwrap(),
    };
    let client = config.client_with(MockProvider::default()).unwrap();
    assert_eq!(client.call(&mut server.transport(), PROC_ECHO, b"cfg").unwrap(), b"cfg");
}
