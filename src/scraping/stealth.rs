//! Script injected before every document the portal loads.
//!
//! The browser runs with a persistent profile and a visible window, so only
//! the automation markers CDP itself leaves behind need hiding; canvas and
//! WebGL are left untouched to keep the fingerprint stable across cycles.

pub const STEALTH_SCRIPT: &str = r#"
(() => {
    try {
        const proto = Navigator.prototype;
        try {
            Object.defineProperty(proto, 'webdriver', {
                get: () => undefined,
                configurable: true,
            });
        } catch (e) {}
        try { delete navigator.webdriver; } catch (e) {}

        try {
            Object.defineProperty(proto, 'languages', {
                get: () => ['pl-PL', 'pl', 'en-US', 'en'],
                configurable: true,
            });
        } catch (e) {}
    } catch (e) {}
})();

if (!window.chrome) {
    window.chrome = {};
}
if (!window.chrome.runtime) {
    window.chrome.runtime = {
        connect: function() { return { onDisconnect: { addListener: function() {} } }; },
        sendMessage: function() {},
    };
}

const originalQuery = window.navigator.permissions && window.navigator.permissions.query;
if (originalQuery) {
    window.navigator.permissions.query = (parameters) => (
        parameters.name === 'notifications'
            ? Promise.resolve({ state: Notification.permission })
            : originalQuery(parameters)
    );
}

delete window.__playwright;
delete window.__puppeteer;
delete window.__selenium;
delete window.cdc_adoQpoasnfa76pfcZLmcfl_Array;
delete window.cdc_adoQpoasnfa76pfcZLmcfl_Promise;
delete window.cdc_adoQpoasnfa76pfcZLmcfl_Symbol;
"#;
