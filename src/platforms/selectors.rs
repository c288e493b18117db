use super::Platform;

/// Selector set for one automation platform. These are configuration data,
/// swapped out when a marketplace reworks its pages; the automation flow in
/// `paths::automation` never hardcodes a selector.
#[derive(Debug)]
pub struct SelectorSet {
    pub login_username: &'static str,
    pub login_password: &'static str,
    pub login_submit: &'static str,
    /// Element that only renders for a logged-in user.
    pub login_success: &'static str,
    pub product_name: &'static str,
    pub product_price: &'static str,
    pub product_description: &'static str,
    pub category_button: &'static str,
    pub image_input: &'static str,
    pub submit_button: &'static str,
    /// Element that only renders once a listing was accepted.
    pub success_indicator: &'static str,
    pub error_indicator: &'static str,
    /// Regex over the post-submit URL; first capture group is the listing id.
    pub listing_url_pattern: &'static str,
}

static BUNJANG: SelectorSet = SelectorSet {
    login_username: "#id",
    login_password: "#pw",
    login_submit: "button[type='submit']",
    login_success: "a[href*='/my']",
    product_name: "input[name='name']",
    product_price: "input[name='price']",
    product_description: "textarea[name='description']",
    category_button: "button[data-category]",
    image_input: "input[type='file']",
    submit_button: "button[data-testid='register-submit']",
    success_indicator: "div[class*='ProductDetail']",
    error_indicator: "div[class*='ErrorMessage']",
    listing_url_pattern: r"/products/(\d+)",
};

static DANGGEUN: SelectorSet = SelectorSet {
    login_username: "input[name='phone']",
    login_password: "input[name='code']",
    login_submit: "button[type='submit']",
    login_success: "a[href*='/my-page']",
    product_name: "input[id='article-title']",
    product_price: "input[id='article-price']",
    product_description: "textarea[id='article-content']",
    category_button: "select[id='article-category']",
    image_input: "input[type='file']",
    submit_button: "button[id='article-submit']",
    success_indicator: "section[class*='article-detail']",
    error_indicator: "p[class*='error']",
    listing_url_pattern: r"/articles/(\d+)",
};

static JUNGGONARA: SelectorSet = SelectorSet {
    login_username: "input[name='userId']",
    login_password: "input[name='userPw']",
    login_submit: "button.login-btn",
    login_success: "div.user-profile",
    product_name: "input[name='title']",
    product_price: "input[name='price']",
    product_description: "textarea[name='content']",
    category_button: "select[name='category']",
    image_input: "input[type='file']",
    submit_button: "button.write-submit",
    success_indicator: "div.product-view",
    error_indicator: "div.alert-error",
    listing_url_pattern: r"/product/(\d+)",
};

pub fn selector_set(platform: Platform) -> Option<&'static SelectorSet> {
    match platform {
        Platform::Bunjang => Some(&BUNJANG),
        Platform::Danggeun => Some(&DANGGEUN),
        Platform::Junggonara => Some(&JUNGGONARA),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_automation_platforms_have_selectors() {
        assert!(selector_set(Platform::Bunjang).is_some());
        assert!(selector_set(Platform::Danggeun).is_some());
        assert!(selector_set(Platform::Junggonara).is_some());
    }

    #[test]
    fn test_api_platforms_have_none() {
        assert!(selector_set(Platform::Naver).is_none());
        assert!(selector_set(Platform::Cafe24).is_none());
        assert!(selector_set(Platform::Coupang).is_none());
    }

    #[test]
    fn test_listing_patterns_compile() {
        for platform in [Platform::Bunjang, Platform::Danggeun, Platform::Junggonara] {
            let set = selector_set(platform).unwrap();
            let re = regex::Regex::new(set.listing_url_pattern).unwrap();
            assert_eq!(re.captures_len(), 2, "one capture group expected");
        }
    }
}
