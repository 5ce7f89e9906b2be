/*
    Integration tests for the persistence pipeline

    Test suite covering:
    - Persister contract normalization over both backend kinds
    - Cipher round trips, nonce freshness and failure modes
    - Orchestrator persist/restore, watch gating and registry behavior
*/

pub mod cipher_tests;
